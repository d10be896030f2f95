//! Boundary to the hosted backend: identity provider and persistence.
//!
//! The core only depends on these traits. [`HostedBackend`] implements both
//! over HTTP; tests use in-memory fakes.

#[cfg(feature = "http")]
mod hosted;

#[cfg(feature = "http")]
pub use hosted::HostedBackend;

use std::future::Future;
use std::time::Duration;

use url::Url;

use crate::mutation::VoteDirection;
use crate::session::{Session, SessionTokens};
use crate::types::ResourceId;

/// Failure talking to the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{operation} failed with HTTP {status}: {detail}")]
    Status {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    /// The backend rejected the credentials (HTTP 401/403).
    #[error("{operation} was not authorized")]
    Unauthorized { operation: &'static str },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Identity provider client library.
///
/// Produces authorization URLs and, for the PKCE flow, trades an
/// authorization code for tokens.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Builds the URL the user is sent to. Never navigates by itself.
    fn authorization_url(
        &self,
        redirect_uri: &Url,
        code_challenge: Option<&str>,
    ) -> impl Future<Output = Result<Url, GatewayError>> + Send;

    /// Exchanges a PKCE authorization code for a token pair.
    fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> impl Future<Output = Result<SessionTokens, GatewayError>> + Send;
}

/// Persistence and session service.
///
/// Vote writes upsert/delete by (user, resource); bookmark writes
/// insert/delete by the same key. All writes are idempotent.
pub trait RemoteGateway: Send + Sync + 'static {
    /// Validates a token pair and resolves the identity behind it.
    fn establish_session(
        &self,
        tokens: &SessionTokens,
    ) -> impl Future<Output = Result<Session, GatewayError>> + Send;

    /// Revokes the session server-side.
    fn sign_out(&self, session: &Session) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn upsert_vote(
        &self,
        session: &Session,
        resource: &ResourceId,
        direction: VoteDirection,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn delete_vote(
        &self,
        session: &Session,
        resource: &ResourceId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn insert_bookmark(
        &self,
        session: &Session,
        resource: &ResourceId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn delete_bookmark(
        &self,
        session: &Session,
        resource: &ResourceId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}
