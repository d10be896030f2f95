use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::intent::{VoteDirection, VoteResolution, VoteState, resolve_vote};
use crate::types::{CorrelationId, ResourceId};

/// The current user's local view of one resource.
///
/// `upvotes`/`downvotes` are a cached projection of the backend aggregate,
/// adjusted optimistically; they are only made authoritative again by a
/// refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceView {
    #[serde(default)]
    pub vote: VoteState,
    pub upvotes: i64,
    pub downvotes: i64,
    #[serde(default)]
    pub bookmarked: bool,
}

impl ResourceView {
    /// Net score shown next to the vote buttons.
    #[must_use]
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    #[must_use]
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Vote => FieldValue::Vote(VoteTally {
                state: self.vote,
                upvotes: self.upvotes,
                downvotes: self.downvotes,
            }),
            Field::Bookmark => FieldValue::Bookmark(self.bookmarked),
        }
    }

    pub fn set(&mut self, value: FieldValue) {
        match value {
            FieldValue::Vote(tally) => {
                self.vote = tally.state;
                self.upvotes = tally.upvotes;
                self.downvotes = tally.downvotes;
            }
            FieldValue::Bookmark(bookmarked) => self.bookmarked = bookmarked,
        }
    }
}

/// Independently mutable part of a [`ResourceView`].
///
/// The vote state and both counters form one field: they always change and
/// roll back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Vote,
    Bookmark,
}

/// Vote state together with the cached counters it adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub state: VoteState,
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteTally {
    /// Applies a button press: resolves the intent and shifts the counters.
    #[must_use]
    pub fn press(self, requested: VoteDirection) -> (Self, VoteResolution) {
        let resolution = resolve_vote(self.state, requested);
        let next = Self {
            state: resolution.next,
            upvotes: self.upvotes + resolution.delta.up,
            downvotes: self.downvotes + resolution.delta.down,
        };
        (next, resolution)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Vote(VoteTally),
    Bookmark(bool),
}

impl FieldValue {
    #[must_use]
    pub fn field(&self) -> Field {
        match self {
            Self::Vote(_) => Field::Vote,
            Self::Bookmark(_) => Field::Bookmark,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchKey {
    pub entity: ResourceId,
    pub field: Field,
}

impl PatchKey {
    #[must_use]
    pub fn new(entity: ResourceId, field: Field) -> Self {
        Self { entity, field }
    }
}

/// An optimistic change waiting for its remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticPatch {
    pub key: PatchKey,
    pub previous: FieldValue,
    pub next: FieldValue,
    pub correlation: CorrelationId,
}

/// Cached resource views plus the outstanding patches against them.
#[derive(Debug, Default)]
pub(crate) struct ResourceCache {
    views: HashMap<ResourceId, ResourceView>,
    patches: HashMap<PatchKey, OptimisticPatch>,
}

impl ResourceCache {
    pub(crate) fn view(&self, id: &ResourceId) -> Option<ResourceView> {
        self.views.get(id).copied()
    }

    /// Unknown resources read as an empty view.
    pub(crate) fn read(&self, key: &PatchKey) -> FieldValue {
        self.views
            .get(&key.entity)
            .copied()
            .unwrap_or_default()
            .get(key.field)
    }

    pub(crate) fn write(&mut self, key: &PatchKey, value: FieldValue) {
        debug_assert_eq!(key.field, value.field(), "value written to the wrong field");
        self.views.entry(key.entity.clone()).or_default().set(value);
    }

    pub(crate) fn patch(&self, key: &PatchKey) -> Option<&OptimisticPatch> {
        self.patches.get(key)
    }

    /// Registers `patch`, returning the one it supersedes.
    pub(crate) fn insert_patch(&mut self, patch: OptimisticPatch) -> Option<OptimisticPatch> {
        self.patches.insert(patch.key.clone(), patch)
    }

    /// Removes the patch for `key` only if it is still `correlation`.
    pub(crate) fn take_patch_if_current(
        &mut self,
        key: &PatchKey,
        correlation: CorrelationId,
    ) -> Option<OptimisticPatch> {
        match self.patches.get(key) {
            Some(patch) if patch.correlation == correlation => self.patches.remove(key),
            _ => None,
        }
    }

    /// Replaces views with authoritative values.
    ///
    /// Fields with an outstanding patch keep their optimistic value; the
    /// write that will settle them is still in flight.
    pub(crate) fn refresh(&mut self, views: impl IntoIterator<Item = (ResourceId, ResourceView)>) {
        for (id, fresh) in views {
            let mut merged = fresh;
            for field in [Field::Vote, Field::Bookmark] {
                let key = PatchKey::new(id.clone(), field);
                if let Some(patch) = self.patches.get(&key) {
                    tracing::debug!(
                        resource_id = %id,
                        ?field,
                        correlation = %patch.correlation,
                        "Keeping optimistic value over refresh"
                    );
                    merged.set(self.read(&key));
                }
            }
            self.views.insert(id, merged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(state: VoteState, upvotes: i64, downvotes: i64) -> VoteTally {
        VoteTally {
            state,
            upvotes,
            downvotes,
        }
    }

    #[test]
    fn press_shifts_counters_with_the_resolution() {
        let (next, _) = tally(VoteState::Up, 10, 2).press(VoteDirection::Down);
        assert_eq!(next, tally(VoteState::Down, 9, 3));

        let (next, _) = next.press(VoteDirection::Down);
        assert_eq!(next, tally(VoteState::None, 9, 2));
    }

    #[test]
    fn view_field_roundtrip() {
        let mut view = ResourceView::default();
        view.set(FieldValue::Vote(tally(VoteState::Up, 3, 1)));
        view.set(FieldValue::Bookmark(true));

        assert_eq!(view.get(Field::Vote), FieldValue::Vote(tally(VoteState::Up, 3, 1)));
        assert_eq!(view.get(Field::Bookmark), FieldValue::Bookmark(true));
        assert_eq!(view.score(), 2);
    }

    #[test]
    fn unknown_resource_reads_empty() {
        let cache = ResourceCache::default();
        let key = PatchKey::new("missing".into(), Field::Bookmark);
        assert_eq!(cache.read(&key), FieldValue::Bookmark(false));
        assert!(cache.view(&key.entity).is_none());
    }

    #[test]
    fn stale_correlation_cannot_take_the_patch() {
        let mut cache = ResourceCache::default();
        let key = PatchKey::new("r".into(), Field::Bookmark);
        let patch = |n| OptimisticPatch {
            key: key.clone(),
            previous: FieldValue::Bookmark(false),
            next: FieldValue::Bookmark(true),
            correlation: CorrelationId(n),
        };

        assert!(cache.insert_patch(patch(1)).is_none());
        assert_eq!(cache.insert_patch(patch(2)).map(|p| p.correlation), Some(CorrelationId(1)));
        assert!(cache.take_patch_if_current(&key, CorrelationId(1)).is_none());
        assert!(cache.take_patch_if_current(&key, CorrelationId(2)).is_some());
        assert!(cache.patch(&key).is_none());
    }

    #[test]
    fn refresh_keeps_patched_fields() {
        let mut cache = ResourceCache::default();
        let id = ResourceId::from("r");
        let key = PatchKey::new(id.clone(), Field::Bookmark);
        cache.write(&key, FieldValue::Bookmark(true));
        cache.insert_patch(OptimisticPatch {
            key: key.clone(),
            previous: FieldValue::Bookmark(false),
            next: FieldValue::Bookmark(true),
            correlation: CorrelationId(1),
        });

        cache.refresh([(
            id.clone(),
            ResourceView {
                vote: VoteState::Down,
                upvotes: 7,
                downvotes: 4,
                bookmarked: false,
            },
        )]);

        let view = cache.view(&id).unwrap();
        assert!(view.bookmarked, "optimistic bookmark survives refresh");
        assert_eq!((view.vote, view.upvotes, view.downvotes), (VoteState::Down, 7, 4));
    }
}
