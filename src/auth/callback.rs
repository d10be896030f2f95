use super::coordinator::{AuthCoordinator, HandshakeOutcome};
use super::host::HostWindow;
use super::message::PopupMessage;
use crate::error::HandshakeError;
use crate::remote::{IdentityProvider, RemoteGateway};

/// What the callback page did.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// Opened as a popup: the URL went to the opener and the window closed.
    PostedToOpener,
    /// Opened by a redirect: the sign-in was completed here.
    Completed(HandshakeOutcome),
}

impl<P, G, H> AuthCoordinator<P, G, H>
where
    P: IdentityProvider,
    G: RemoteGateway,
    H: HostWindow,
{
    /// Entry point of the OAuth callback page.
    ///
    /// In a popup the full callback URL, fragment included, is posted to
    /// the opener. The target origin is the page's own origin, so no other
    /// site can receive the tokens.
    ///
    /// # Errors
    ///
    /// As for [`complete_redirect`](Self::complete_redirect).
    pub async fn enter_callback(&self) -> Result<CallbackOutcome, HandshakeError> {
        let host = self.host();
        if !host.has_opener() {
            return self.complete_redirect().await.map(CallbackOutcome::Completed);
        }

        let url = host.current_url();
        let target_origin = url.origin().ascii_serialization();
        let message = PopupMessage::AuthSuccess {
            url: url.to_string(),
        };
        host.post_to_opener(&message, &target_origin);
        tracing::info!(target_origin = %target_origin, "Posted callback URL to opener");
        host.close();
        Ok(CallbackOutcome::PostedToOpener)
    }
}
