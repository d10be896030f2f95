//! Optimistic vote and bookmark mutations.

mod board;
mod cache;
mod executor;
mod intent;

pub use board::ResourceBoard;
pub use cache::{Field, FieldValue, OptimisticPatch, PatchKey, ResourceView, VoteTally};
pub use executor::{InFlight, OptimisticExecutor, Settlement};
pub use intent::{
    RemoteOp, VoteDelta, VoteDirection, VoteResolution, VoteState, resolve_bookmark, resolve_vote,
};
