//! Ordered subscriber registry keyed by [`EventKind`].
//!
//! Callbacks run synchronously on the publishing task, in registration
//! order. A panicking callback is logged and skipped; the rest still run.
//! The subscriber list is snapshotted before invocation, so callbacks may
//! subscribe or unsubscribe without deadlocking.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::events::{EventKind, SessionEvent};

/// Subscriber callback.
pub type Callback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<EventKind, Vec<(SubscriptionId, Callback)>>,
}

/// Cloneable handle to a shared subscriber registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    inner: Arc<RwLock<Registry>>,
}

impl EventDispatcher {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the list for `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.write();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .subscribers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.write();
        for list in registry.subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|(sub, _)| *sub == id) {
                let _ = list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of callbacks registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .read()
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every callback registered for the event's kind.
    ///
    /// Returns how many callbacks completed without panicking.
    pub fn publish(&self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(SubscriptionId, Callback)> = self
            .inner
            .read()
            .subscribers
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut completed = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let panic = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic".to_string());
                    error!(subscription = %id, ?kind, %panic, "subscriber panicked");
                }
            }
        }
        completed
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.read();
        let total: usize = registry.subscribers.values().map(Vec::len).sum();
        f.debug_struct("EventDispatcher")
            .field("subscribers", &total)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
