//! Ordered listener storage for the alert channel.
//!
//! Listeners are kept in registration order and invoked synchronously. Every
//! registration gets its own id, so registering the same callback twice
//! produces two independent entries and two invocations per alert.

use crate::core::Alert;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, Weak,
};
use tracing::trace;

/// A callback invoked once per received alert.
pub type Listener = Arc<dyn Fn(&Alert) + Send + Sync>;

#[derive(Default)]
struct Entries {
    listeners: Vec<(u64, Listener)>,
}

/// An append-ordered set of alert listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    entries: Arc<Mutex<Entries>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener and returns the handle that owns the registration.
    pub fn register(&self, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().listeners.push((id, listener));
        trace!(listener_id = id, "Registered alert listener");
        Subscription {
            id,
            entries: Some(Arc::downgrade(&self.entries)),
        }
    }

    /// Invokes every listener with `alert`, in registration order.
    ///
    /// The listener list is snapshotted first, so listeners may register or
    /// drop subscriptions while being notified. A panic in a listener is not
    /// caught: it unwinds out of this call and the remaining listeners are
    /// not invoked.
    pub fn notify(&self, alert: &Alert) {
        let snapshot: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            listener(alert);
        }
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        lock_entries(&self.entries)
    }
}

// The lock is never held across a listener call, so a poisoned mutex still
// holds a consistent list.
fn lock_entries(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A scoped listener registration.
///
/// Dropping the handle removes exactly the registration it owns. Call
/// [`Subscription::detach`] to keep the listener for as long as the registry
/// lives.
#[must_use = "dropping a Subscription immediately removes the listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    entries: Option<Weak<Mutex<Entries>>>,
}

impl Subscription {
    /// Keeps the listener registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.entries = None;
    }

    /// Returns the id of this registration.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(entries) = self.entries.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let mut guard = lock_entries(&entries);
        guard.listeners.retain(|(id, _)| *id != self.id);
        trace!(listener_id = self.id, "Removed alert listener");
    }
}
