use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use url::Url;

use super::host::{HostCapabilities, HostWindow, ListenerGuard, PopupWindow, WindowMessage};
use super::machine::{AttemptId, Entry, HandshakeEvent, HandshakeMachine, HandshakeState};
use super::message::{Completion, PopupMessage};
use super::origin::HostPattern;
use crate::config::ClientConfig;
use crate::error::HandshakeError;
use crate::pkce::{PkcePair, generate_request_id};
use crate::remote::{IdentityProvider, RemoteGateway};
use crate::session::{Session, SessionStore, SessionTokens};
use crate::types::RequestId;

/// Host storage key for the redirect-mode PKCE verifier.
pub const PKCE_VERIFIER_KEY: &str = "devhub.pkce_verifier";

/// How the provider page is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Secondary window plus a cross-window message back.
    Popup,
    /// Whole-window navigation and a callback page.
    Redirect,
}

impl AuthMode {
    /// Popup mode needs popups, cross-window messaging and a listed hostname.
    #[must_use]
    pub fn select(
        capabilities: HostCapabilities,
        hostname: &str,
        popup_hosts: &[HostPattern],
    ) -> Self {
        let capable = capabilities.popups && capabilities.cross_window_messaging;
        if capable && popup_hosts.iter().any(|p| p.matches(hostname)) {
            Self::Popup
        } else {
            Self::Redirect
        }
    }
}

/// How a handshake ended, when it did not fail.
#[derive(Debug, Clone)]
pub enum HandshakeOutcome {
    /// Redirect mode: the window is on its way to the provider.
    Navigated,
    SessionEstablished(Session),
    /// The user closed the popup. Silent: no message, no session.
    Abandoned,
    /// The completion URL carried no tokens; the window reloads with them.
    ReloadedInPlace,
    /// Another handshake was already running; nothing was started.
    AlreadyInProgress,
}

/// One running attempt.
///
/// Dropping it before a terminal state (the driving future was cancelled)
/// moves the machine to `Abandoned`.
struct PendingAuthRequest<'a> {
    machine: &'a Mutex<HandshakeMachine>,
    attempt: AttemptId,
    request_id: RequestId,
}

impl PendingAuthRequest<'_> {
    fn advance(&self, event: HandshakeEvent) -> bool {
        let mut machine = lock(self.machine);
        let from = machine.state();
        let moved = machine.apply(self.attempt, event);
        if moved {
            tracing::debug!(
                request_id = %self.request_id,
                attempt = %self.attempt,
                ?from,
                to = ?machine.state(),
                "Handshake transition"
            );
        } else {
            tracing::debug!(
                request_id = %self.request_id,
                attempt = %self.attempt,
                current = %machine.attempt(),
                state = ?from,
                ?event,
                "Handshake event discarded"
            );
        }
        moved
    }

    fn fail(&self, error: HandshakeError) -> HandshakeError {
        self.advance(HandshakeEvent::Failed((&error).into()));
        tracing::warn!(request_id = %self.request_id, error = %error, "Sign-in failed");
        error
    }
}

impl Drop for PendingAuthRequest<'_> {
    fn drop(&mut self) {
        if lock(self.machine).apply(self.attempt, HandshakeEvent::Cancelled) {
            tracing::info!(request_id = %self.request_id, "Sign-in cancelled");
        }
    }
}

fn lock(machine: &Mutex<HandshakeMachine>) -> MutexGuard<'_, HandshakeMachine> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the sign-in handshake and owns writes to the [`SessionStore`].
pub struct AuthCoordinator<P, G, H> {
    config: ClientConfig,
    provider: Arc<P>,
    gateway: Arc<G>,
    host: Arc<H>,
    store: SessionStore,
    machine: Mutex<HandshakeMachine>,
}

impl<P, G, H> AuthCoordinator<P, G, H>
where
    P: IdentityProvider,
    G: RemoteGateway,
    H: HostWindow,
{
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        provider: Arc<P>,
        gateway: Arc<G>,
        host: Arc<H>,
        store: SessionStore,
    ) -> Self {
        Self {
            config: config.clone(),
            provider,
            gateway,
            host,
            store,
            machine: Mutex::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub(crate) fn host(&self) -> &H {
        &self.host
    }

    #[must_use]
    pub fn mode(&self) -> AuthMode {
        AuthMode::select(
            self.host.capabilities(),
            &self.host.hostname(),
            &self.config.popup_hosts,
        )
    }

    #[must_use]
    pub fn state(&self) -> HandshakeState {
        lock(&self.machine).state()
    }

    /// True for the lifetime of a handshake; cleared by every terminal state.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().is_in_progress()
    }

    fn begin(&self, entry: Entry) -> Option<PendingAuthRequest<'_>> {
        let attempt = lock(&self.machine).begin(entry)?;
        let request_id = generate_request_id();
        tracing::info!(request_id = %request_id, %attempt, ?entry, "Handshake started");
        Some(PendingAuthRequest {
            machine: &self.machine,
            attempt,
            request_id,
        })
    }

    /// Starts sign-in in the mode the host supports.
    ///
    /// # Errors
    ///
    /// Any [`HandshakeError`]. The session store is left untouched.
    pub async fn sign_in(&self) -> Result<HandshakeOutcome, HandshakeError> {
        let mode = self.mode();
        let entry = match mode {
            AuthMode::Popup => Entry::Popup,
            AuthMode::Redirect => Entry::Redirect,
        };
        let Some(request) = self.begin(entry) else {
            tracing::info!(?mode, "Sign-in already in progress");
            return Ok(HandshakeOutcome::AlreadyInProgress);
        };

        match mode {
            AuthMode::Redirect => self.sign_in_redirect(&request).await,
            AuthMode::Popup => self.sign_in_popup(&request).await,
        }
    }

    async fn authorization_url(
        &self,
        request: &PendingAuthRequest<'_>,
        pkce: Option<&PkcePair>,
    ) -> Result<Url, HandshakeError> {
        self.provider
            .authorization_url(&self.config.redirect_uri, pkce.map(PkcePair::challenge))
            .await
            .map_err(|e| request.fail(HandshakeError::ProviderError(e.to_string())))
    }

    async fn sign_in_redirect(
        &self,
        request: &PendingAuthRequest<'_>,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let pkce = self.config.use_pkce.then(PkcePair::generate);
        let url = self.authorization_url(request, pkce.as_ref()).await?;

        if let Some(pkce) = &pkce {
            self.host.store_item(PKCE_VERIFIER_KEY, pkce.verifier());
        }
        request.advance(HandshakeEvent::Navigated);
        self.host.navigate(url.as_str());
        Ok(HandshakeOutcome::Navigated)
    }

    async fn sign_in_popup(
        &self,
        request: &PendingAuthRequest<'_>,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let pkce = self.config.use_pkce.then(PkcePair::generate);
        let url = self.authorization_url(request, pkce.as_ref()).await?;

        let Some(popup) = self.host.open_popup(&url, &self.config.popup) else {
            return Err(request.fail(HandshakeError::PopupBlocked));
        };
        request.advance(HandshakeEvent::PopupOpened);

        let (sink, mut messages) = mpsc::unbounded_channel();
        let listener = ListenerGuard::register(&*self.host, sink);
        request.advance(HandshakeEvent::ListenerRegistered);

        // `interval` rejects a zero period.
        let period = self.config.popup_poll_interval.max(Duration::from_millis(1));
        let mut poll = tokio::time::interval(period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let completion = loop {
            tokio::select! {
                biased;

                Some(message) = messages.recv() => {
                    if let Some(completion) = self.accept(request, message) {
                        break completion;
                    }
                }
                _ = poll.tick() => {
                    if popup.is_closed() {
                        request.advance(HandshakeEvent::PopupClosed);
                        tracing::info!(
                            request_id = %request.request_id,
                            "Popup closed before completion"
                        );
                        return Ok(HandshakeOutcome::Abandoned);
                    }
                }
            }
        };
        drop(listener);

        match completion {
            Completion::Tokens(tokens) => {
                request.advance(HandshakeEvent::CompletionAccepted);
                self.exchange(request, tokens).await
            }
            Completion::Code(code) => {
                let Some(pkce) = &pkce else {
                    return Err(request.fail(HandshakeError::ProviderError(
                        "authorization code returned but PKCE was not requested".into(),
                    )));
                };
                request.advance(HandshakeEvent::CompletionAccepted);
                let tokens = self
                    .provider
                    .exchange_code(&code, pkce.verifier())
                    .await
                    .map_err(|e| request.fail(HandshakeError::SessionExchangeFailed(e)))?;
                self.exchange(request, tokens).await
            }
            Completion::ProviderError(detail) => {
                Err(request.fail(HandshakeError::ProviderError(detail)))
            }
            Completion::Incomplete(fragment) => {
                request.advance(HandshakeEvent::FragmentIncomplete);
                tracing::info!(
                    request_id = %request.request_id,
                    "No tokens in completion URL, reloading in place"
                );
                self.host.reload_with_fragment(&fragment);
                Ok(HandshakeOutcome::ReloadedInPlace)
            }
        }
    }

    /// Filters one cross-window message. `None` means keep waiting.
    fn accept(
        &self,
        request: &PendingAuthRequest<'_>,
        message: WindowMessage,
    ) -> Option<Completion> {
        if !self.config.trusted_origins.allows(&message.origin) {
            tracing::debug!(
                request_id = %request.request_id,
                origin = %message.origin,
                "Ignoring message from untrusted origin"
            );
            return None;
        }
        let Ok(PopupMessage::AuthSuccess { url }) = serde_json::from_value(message.data) else {
            tracing::debug!(origin = %message.origin, "Ignoring unrelated message");
            return None;
        };
        match Url::parse(&url) {
            Ok(url) => Some(Completion::parse(&url)),
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    error = %e,
                    "Ignoring completion message with malformed URL"
                );
                None
            }
        }
    }

    /// Turns tokens into a session and commits it, unless the attempt is
    /// no longer current.
    async fn exchange(
        &self,
        request: &PendingAuthRequest<'_>,
        tokens: SessionTokens,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let session = self
            .gateway
            .establish_session(&tokens)
            .await
            .map_err(|e| request.fail(HandshakeError::SessionExchangeFailed(e)))?;

        if !request.advance(HandshakeEvent::ExchangeSucceeded) {
            tracing::info!(
                request_id = %request.request_id,
                "Discarding session from a superseded attempt"
            );
            return Ok(HandshakeOutcome::Abandoned);
        }

        tracing::info!(
            request_id = %request.request_id,
            user_id = %session.user_id(),
            "Sign-in completed"
        );
        self.store.set(Some(session.clone()));
        Ok(HandshakeOutcome::SessionEstablished(session))
    }

    /// Completes a redirect-mode sign-in from the callback URL the host is
    /// currently at, then navigates to the home path.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::ProviderError`] when the provider reported an error
    /// or the URL carried no credentials,
    /// [`HandshakeError::SessionExchangeFailed`] when the exchange failed.
    pub async fn complete_redirect(&self) -> Result<HandshakeOutcome, HandshakeError> {
        let Some(request) = self.begin(Entry::Exchange) else {
            return Ok(HandshakeOutcome::AlreadyInProgress);
        };
        let verifier = self.host.take_item(PKCE_VERIFIER_KEY);

        let tokens = match Completion::parse(&self.host.current_url()) {
            Completion::Tokens(tokens) => tokens,
            Completion::Code(code) => {
                let Some(verifier) = verifier else {
                    return Err(request.fail(HandshakeError::ProviderError(
                        "authorization code returned without a stored verifier".into(),
                    )));
                };
                self.provider
                    .exchange_code(&code, &verifier)
                    .await
                    .map_err(|e| request.fail(HandshakeError::SessionExchangeFailed(e)))?
            }
            Completion::ProviderError(detail) => {
                return Err(request.fail(HandshakeError::ProviderError(detail)));
            }
            Completion::Incomplete(_) => {
                return Err(request.fail(HandshakeError::ProviderError(
                    "callback URL carried no credentials".into(),
                )));
            }
        };

        let outcome = self.exchange(&request, tokens).await?;
        if matches!(outcome, HandshakeOutcome::SessionEstablished(_)) {
            self.host.navigate(&self.config.home_path);
        }
        Ok(outcome)
    }

    /// Re-establishes a session from tokens persisted by an earlier run.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::SessionExchangeFailed`] if the tokens are no longer
    /// accepted.
    pub async fn restore(&self, tokens: SessionTokens) -> Result<HandshakeOutcome, HandshakeError> {
        let Some(request) = self.begin(Entry::Exchange) else {
            return Ok(HandshakeOutcome::AlreadyInProgress);
        };
        self.exchange(&request, tokens).await
    }

    /// Signs out locally, revoking the session remotely on a best-effort basis.
    pub async fn sign_out(&self) {
        let Some(session) = self.store.current() else {
            return;
        };
        if let Err(e) = self.gateway.sign_out(&session).await {
            tracing::warn!(
                user_id = %session.user_id(),
                error = %e,
                "Remote sign-out failed, clearing local session anyway"
            );
        }
        self.store.set(None);
        tracing::info!(user_id = %session.user_id(), "Signed out");
    }

    /// Clears the session when its access token expired at or before `now`.
    pub fn invalidate_if_expired(&self, now: OffsetDateTime) -> bool {
        let expired = self
            .store
            .current()
            .is_some_and(|session| session.is_expired_at(now));
        if expired {
            tracing::info!("Access token expired, clearing session");
            self.store.set(None);
        }
        expired
    }
}
