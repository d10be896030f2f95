//! Pure handshake state machine.
//!
//! Every event is tagged with the attempt it belongs to. Events for an older
//! attempt, events that arrive after a terminal state and events with no
//! transition from the current state are all rejected: [`HandshakeMachine::apply`]
//! returns `false` and the state does not move.

use std::fmt;

use crate::error::HandshakeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    PopupBlocked,
    ProviderError,
    SessionExchangeFailed,
}

impl From<&HandshakeError> for FailureReason {
    fn from(e: &HandshakeError) -> Self {
        match e {
            HandshakeError::PopupBlocked => Self::PopupBlocked,
            HandshakeError::ProviderError(_) => Self::ProviderError,
            HandshakeError::SessionExchangeFailed(_) => Self::SessionExchangeFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandshakeState {
    #[default]
    Idle,
    // Redirect mode.
    Requesting,
    Navigated,
    // Popup mode.
    AwaitingProviderUrl,
    WindowOpened,
    AwaitingMessage,
    Exchanging,
    SessionEstablished,
    Failed(FailureReason),
    Abandoned,
    ReloadedInPlace,
}

impl HandshakeState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Navigated
                | Self::SessionEstablished
                | Self::Failed(_)
                | Self::Abandoned
                | Self::ReloadedInPlace
        )
    }

    #[must_use]
    pub fn is_in_progress(self) -> bool {
        self != Self::Idle && !self.is_terminal()
    }
}

/// Where a new attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Redirect,
    Popup,
    /// Straight to exchanging: callback completion or restoring stored tokens.
    Exchange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Redirect mode: the window is navigating to the provider.
    Navigated,
    PopupOpened,
    PopupBlocked,
    ListenerRegistered,
    /// A trusted completion message carried credentials.
    CompletionAccepted,
    /// A trusted completion message carried no usable credentials.
    FragmentIncomplete,
    PopupClosed,
    ExchangeSucceeded,
    Failed(FailureReason),
    /// The driving task went away before reaching a terminal state.
    Cancelled,
}

#[derive(Debug, Default)]
pub struct HandshakeMachine {
    state: HandshakeState,
    attempt: AttemptId,
}

impl HandshakeMachine {
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    #[must_use]
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Starts a new attempt unless one is in progress.
    pub fn begin(&mut self, entry: Entry) -> Option<AttemptId> {
        if self.state.is_in_progress() {
            return None;
        }
        self.attempt = AttemptId(self.attempt.0 + 1);
        self.state = match entry {
            Entry::Redirect => HandshakeState::Requesting,
            Entry::Popup => HandshakeState::AwaitingProviderUrl,
            Entry::Exchange => HandshakeState::Exchanging,
        };
        Some(self.attempt)
    }

    /// Applies `event` for `attempt`. Returns whether the state moved.
    pub fn apply(&mut self, attempt: AttemptId, event: HandshakeEvent) -> bool {
        if attempt != self.attempt || self.state.is_terminal() {
            return false;
        }
        match next_state(self.state, event) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }
}

fn next_state(state: HandshakeState, event: HandshakeEvent) -> Option<HandshakeState> {
    use HandshakeEvent as E;
    use HandshakeState as S;

    let next = match (state, event) {
        (S::Idle, _) => return None,
        (_, E::Cancelled) => S::Abandoned,

        (S::Requesting, E::Navigated) => S::Navigated,
        (S::Requesting, E::Failed(reason @ FailureReason::ProviderError)) => S::Failed(reason),

        (S::AwaitingProviderUrl, E::PopupOpened) => S::WindowOpened,
        (S::AwaitingProviderUrl, E::PopupBlocked) => S::Failed(FailureReason::PopupBlocked),
        (
            S::AwaitingProviderUrl,
            E::Failed(reason @ (FailureReason::ProviderError | FailureReason::PopupBlocked)),
        ) => S::Failed(reason),

        (S::WindowOpened, E::ListenerRegistered) => S::AwaitingMessage,
        (S::WindowOpened, E::PopupClosed) => S::Abandoned,

        (S::AwaitingMessage, E::CompletionAccepted) => S::Exchanging,
        (S::AwaitingMessage, E::FragmentIncomplete) => S::ReloadedInPlace,
        (S::AwaitingMessage, E::PopupClosed) => S::Abandoned,
        (S::AwaitingMessage, E::Failed(reason @ FailureReason::ProviderError)) => {
            S::Failed(reason)
        }

        (S::Exchanging, E::ExchangeSucceeded) => S::SessionEstablished,
        (S::Exchanging, E::Failed(reason)) => S::Failed(reason),

        _ => return None,
    };
    Some(next)
}
