//! Cross-window OAuth handshake.
//!
//! [`AuthCoordinator`] picks popup or redirect mode from the host's
//! capabilities, drives the [`HandshakeMachine`] and commits the resulting
//! session to the [`SessionStore`](crate::session::SessionStore).

mod callback;
mod coordinator;
mod host;
mod machine;
mod message;
mod origin;

pub use callback::CallbackOutcome;
pub use coordinator::{AuthCoordinator, AuthMode, HandshakeOutcome, PKCE_VERIFIER_KEY};
pub use host::{HostCapabilities, HostWindow, ListenerId, PopupWindow, WindowMessage};
pub use machine::{
    AttemptId, Entry, FailureReason, HandshakeEvent, HandshakeMachine, HandshakeState,
};
pub use message::{Completion, PopupMessage};
pub use origin::{HostPattern, OriginAllowList, TrustedOrigin};
