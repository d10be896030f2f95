use crate::remote::GatewayError;

/// Crate-level error for construction-time failures.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Token error: {0}")]
    Token(String),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

/// Sign-in failures surfaced to the initiating UI.
///
/// A popup closed by the user is not an error and is reported as
/// [`HandshakeOutcome::Abandoned`](crate::auth::HandshakeOutcome::Abandoned).
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The host refused to open the popup window.
    #[error("Popup blocked")]
    PopupBlocked,

    /// The identity provider rejected the authorization request.
    #[error("Identity provider error: {0}")]
    ProviderError(String),

    /// Tokens were received but could not be turned into a session.
    #[error("Session exchange failed: {0}")]
    SessionExchangeFailed(#[source] GatewayError),
}

impl HandshakeError {
    /// Message suitable for display next to the sign-in button.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PopupBlocked => "Popup blocked! Please allow popups for this site.",
            Self::ProviderError(_) => "Failed to sign in with GitHub.",
            Self::SessionExchangeFailed(_) => "Failed to establish session. Please try again.",
        }
    }
}

/// Vote/bookmark failures. Never fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// No session: nothing was applied, the caller should start sign-in.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The remote write failed and the local change was rolled back.
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(#[source] GatewayError),
}
