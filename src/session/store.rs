use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::Session;

type Listener = Arc<dyn Fn(Option<&Session>) + Send + Sync>;

#[derive(Default)]
struct Inner {
    current: Option<Session>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holder of the current session.
///
/// Cheap to clone; clones share the same session. Only the sign-in
/// coordinator and the sign-out path write it.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        lock(&self.inner).current.clone()
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        lock(&self.inner).current.is_some()
    }

    /// Registers `listener`; it is called on every `set`, in registration order.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Unsubscribe {
            store: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Replaces the session and notifies every listener before returning.
    ///
    /// No transition is skipped, including Session→Session replacement and
    /// setting `None` twice.
    pub(crate) fn set(&self, session: Option<Session>) {
        let listeners: Vec<Listener> = {
            let mut inner = lock(&self.inner);
            match (&inner.current, &session) {
                (None, Some(s)) => tracing::info!(user_id = %s.user_id(), "Session established"),
                (Some(_), Some(s)) => tracing::debug!(user_id = %s.user_id(), "Session replaced"),
                (Some(old), None) => tracing::info!(user_id = %old.user_id(), "Session cleared"),
                (None, None) => {}
            }
            inner.current.clone_from(&session);
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        // Lock released: listeners may read the store.
        for listener in listeners {
            listener(session.as_ref());
        }
    }
}

/// Handle returned by [`SessionStore::subscribe`].
///
/// Dropping it unsubscribes; call [`detach`](Self::detach) to keep the
/// listener for the life of the store.
#[must_use = "dropping the handle unsubscribes the listener"]
pub struct Unsubscribe {
    store: Weak<Mutex<Inner>>,
    id: Option<u64>,
}

impl Unsubscribe {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    pub fn detach(mut self) {
        self.id = None;
    }

    fn remove(&mut self) {
        let Some(id) = self.id.take() else { return };
        if let Some(store) = self.store.upgrade() {
            lock(&store).listeners.retain(|(lid, _)| *lid != id);
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.remove();
    }
}
