use serde::{Deserialize, Serialize};

/// Direction of a vote button press; also the wire `vote_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// The user's vote on one resource. Exactly one at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    #[default]
    None,
    Up,
    Down,
}

impl From<VoteDirection> for VoteState {
    fn from(direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => Self::Up,
            VoteDirection::Down => Self::Down,
        }
    }
}

impl From<Option<VoteDirection>> for VoteState {
    fn from(direction: Option<VoteDirection>) -> Self {
        direction.map_or(Self::None, Self::from)
    }
}

impl VoteState {
    /// The direction currently held, if any.
    #[must_use]
    pub fn direction(self) -> Option<VoteDirection> {
        match self {
            Self::None => None,
            Self::Up => Some(VoteDirection::Up),
            Self::Down => Some(VoteDirection::Down),
        }
    }

    fn counts(self) -> VoteDelta {
        match self {
            Self::None => VoteDelta::default(),
            Self::Up => VoteDelta { up: 1, down: 0 },
            Self::Down => VoteDelta { up: 0, down: 1 },
        }
    }
}

/// Change to the cached (upvotes, downvotes) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteDelta {
    pub up: i64,
    pub down: i64,
}

/// Minimal remote write that makes the backend match a resolved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    UpsertVote(VoteDirection),
    DeleteVote,
    InsertBookmark,
    DeleteBookmark,
}

impl RemoteOp {
    #[must_use]
    pub fn for_vote(next: VoteState) -> Self {
        next.direction().map_or(Self::DeleteVote, Self::UpsertVote)
    }

    #[must_use]
    pub fn for_bookmark(next: bool) -> Self {
        if next {
            Self::InsertBookmark
        } else {
            Self::DeleteBookmark
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResolution {
    pub next: VoteState,
    pub delta: VoteDelta,
}

impl VoteResolution {
    #[must_use]
    pub fn remote_op(&self) -> RemoteOp {
        RemoteOp::for_vote(self.next)
    }
}

/// Resolves a vote button press.
///
/// Pressing the held direction clears the vote; pressing the other one
/// switches directly, removing the old vote and adding the new one in a
/// single delta.
#[must_use]
pub fn resolve_vote(current: VoteState, requested: VoteDirection) -> VoteResolution {
    let next = if current == VoteState::from(requested) {
        VoteState::None
    } else {
        VoteState::from(requested)
    };
    let (before, after) = (current.counts(), next.counts());
    VoteResolution {
        next,
        delta: VoteDelta {
            up: after.up - before.up,
            down: after.down - before.down,
        },
    }
}

#[must_use]
pub fn resolve_bookmark(current: bool) -> bool {
    !current
}
