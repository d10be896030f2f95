#![doc = include_str!("../README.md")]

pub mod auth;
pub mod claims;
pub mod config;
pub mod error;
pub mod mutation;
pub mod pkce;
pub mod remote;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use auth::{
    AuthCoordinator, AuthMode, CallbackOutcome, HandshakeOutcome, HandshakeState, HostWindow,
    PopupWindow,
};
pub use config::{ClientConfig, PopupSpec};
pub use error::{Error, HandshakeError, MutationError};
pub use mutation::{
    OptimisticExecutor, ResourceBoard, ResourceView, Settlement, VoteDirection, VoteState,
};
#[cfg(feature = "http")]
pub use remote::HostedBackend;
pub use remote::{GatewayError, IdentityProvider, RemoteGateway};
pub use session::{Identity, Session, SessionStore, SessionTokens};
pub use types::{CorrelationId, ResourceId, UserId};
