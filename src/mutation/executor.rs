use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::cache::{FieldValue, OptimisticPatch, PatchKey, ResourceCache, ResourceView};
use crate::error::MutationError;
use crate::remote::GatewayError;
use crate::session::{Session, SessionStore};
use crate::types::{CorrelationId, ResourceId};

/// How a mutation ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The remote write succeeded; the optimistic value stands.
    Committed { correlation: CorrelationId },
    /// The remote write returned an authoritative value, now in the cache.
    Reconciled {
        correlation: CorrelationId,
        value: FieldValue,
    },
    /// A newer mutation on the same field owns it; this result was discarded.
    Superseded { correlation: CorrelationId },
}

/// A mutation that has been applied locally and awaits its remote result.
///
/// Dropping it unsettled (the driving future was cancelled) rolls the field
/// back to its snapshot, unless a newer mutation already owns the field.
#[must_use = "an in-flight mutation must be settled"]
pub struct InFlight {
    patch: OptimisticPatch,
    session: Session,
    state: Arc<Mutex<ExecutorState>>,
    armed: bool,
}

impl InFlight {
    #[must_use]
    pub fn patch(&self) -> &OptimisticPatch {
        &self.patch
    }

    /// The session the mutation was authorized against.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("patch", &self.patch)
            .field("session", &self.session)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let patch = &self.patch;
        if state
            .cache
            .take_patch_if_current(&patch.key, patch.correlation)
            .is_some()
        {
            state.cache.write(&patch.key, patch.previous);
            tracing::debug!(
                resource_id = %patch.key.entity,
                field = ?patch.key.field,
                correlation = %patch.correlation,
                "Mutation dropped before settling, rolled back"
            );
        }
    }
}

#[derive(Default)]
struct ExecutorState {
    cache: ResourceCache,
    next_correlation: u64,
}

/// Applies vote/bookmark changes optimistically and reconciles them.
///
/// Owns the resource cache: it is the only writer of cached counters.
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct OptimisticExecutor {
    store: SessionStore,
    state: Arc<Mutex<ExecutorState>>,
    write_timeout: Duration,
}

impl OptimisticExecutor {
    #[must_use]
    pub fn new(store: SessionStore, write_timeout: Duration) -> Self {
        Self {
            store,
            state: Arc::default(),
            write_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn view(&self, id: &ResourceId) -> Option<ResourceView> {
        self.lock().cache.view(id)
    }

    #[must_use]
    pub fn value(&self, key: &PatchKey) -> FieldValue {
        self.lock().cache.read(key)
    }

    /// The outstanding patch on `key`, if a write is in flight.
    #[must_use]
    pub fn pending(&self, key: &PatchKey) -> Option<OptimisticPatch> {
        self.lock().cache.patch(key).cloned()
    }

    /// Loads authoritative views (the result of a full list fetch).
    pub fn refresh(&self, views: impl IntoIterator<Item = (ResourceId, ResourceView)>) {
        self.lock().cache.refresh(views);
    }

    /// Checks the session, snapshots the field and applies `apply` to it.
    ///
    /// The new value is visible to readers when this returns. Any patch
    /// already outstanding on `key` is superseded.
    ///
    /// # Errors
    ///
    /// [`MutationError::Unauthenticated`] if nobody is signed in; nothing is
    /// applied in that case.
    pub fn begin(
        &self,
        key: PatchKey,
        apply: impl FnOnce(FieldValue) -> FieldValue,
    ) -> Result<InFlight, MutationError> {
        let session = self.store.current().ok_or(MutationError::Unauthenticated)?;

        let mut state = self.lock();
        let previous = state.cache.read(&key);
        let next = apply(previous);
        state.next_correlation += 1;
        let correlation = CorrelationId(state.next_correlation);

        state.cache.write(&key, next);
        let patch = OptimisticPatch {
            key,
            previous,
            next,
            correlation,
        };
        if let Some(old) = state.cache.insert_patch(patch.clone()) {
            tracing::debug!(
                resource_id = %patch.key.entity,
                field = ?patch.key.field,
                superseded = %old.correlation,
                correlation = %correlation,
                "Superseding in-flight mutation"
            );
        }

        Ok(InFlight {
            patch,
            session,
            state: Arc::clone(&self.state),
            armed: true,
        })
    }

    /// Reconciles a finished remote write.
    ///
    /// Only the latest mutation on a field may touch it: a stale result is
    /// discarded whatever it says. A failed latest mutation restores the
    /// snapshot taken in [`begin`](Self::begin).
    ///
    /// # Errors
    ///
    /// [`MutationError::RemoteWriteFailed`] after rolling back.
    pub fn settle(
        &self,
        mut in_flight: InFlight,
        result: Result<Option<FieldValue>, GatewayError>,
    ) -> Result<Settlement, MutationError> {
        in_flight.armed = false;
        let patch = &in_flight.patch;
        let mut state = self.lock();

        if state
            .cache
            .take_patch_if_current(&patch.key, patch.correlation)
            .is_none()
        {
            tracing::debug!(
                resource_id = %patch.key.entity,
                field = ?patch.key.field,
                correlation = %patch.correlation,
                ok = result.is_ok(),
                "Discarding result of superseded mutation"
            );
            return Ok(Settlement::Superseded {
                correlation: patch.correlation,
            });
        }

        match result {
            Ok(None) => Ok(Settlement::Committed {
                correlation: patch.correlation,
            }),
            Ok(Some(value)) => {
                state.cache.write(&patch.key, value);
                Ok(Settlement::Reconciled {
                    correlation: patch.correlation,
                    value,
                })
            }
            Err(e) => {
                state.cache.write(&patch.key, patch.previous);
                tracing::warn!(
                    resource_id = %patch.key.entity,
                    field = ?patch.key.field,
                    correlation = %patch.correlation,
                    error = %e,
                    "Remote write failed, rolled back"
                );
                Err(MutationError::RemoteWriteFailed(e))
            }
        }
    }

    /// Runs a whole mutation: [`begin`](Self::begin), the bounded remote
    /// call, then [`settle`](Self::settle).
    ///
    /// `remote` receives the authorizing session and the applied value and
    /// may return an authoritative value to reconcile with.
    ///
    /// # Errors
    ///
    /// See [`begin`](Self::begin) and [`settle`](Self::settle).
    pub async fn execute<F, Fut>(
        &self,
        key: PatchKey,
        apply: impl FnOnce(FieldValue) -> FieldValue,
        remote: F,
    ) -> Result<Settlement, MutationError>
    where
        F: FnOnce(Session, FieldValue) -> Fut,
        Fut: Future<Output = Result<Option<FieldValue>, GatewayError>>,
    {
        let in_flight = self.begin(key, apply)?;
        let call = remote(in_flight.session.clone(), in_flight.patch.next);
        let result = match tokio::time::timeout(self.write_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.write_timeout)),
        };
        self.settle(in_flight, result)
    }
}
