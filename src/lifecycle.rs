//! Lifecycle notifications for registry changes.
//!
//! The dispatcher announces every subscribe and unsubscribe through a
//! [`LifecycleSink`]. [`LifecycleEmitter`] is a small named-event emitter
//! that fans those notifications out to listeners registered with
//! `on` / `once`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which notification a listener wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Subscribe,
    Unsubscribe,
}

impl LifecycleKind {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleKind::Subscribe => "subscribe",
            LifecycleKind::Unsubscribe => "unsubscribe",
        }
    }
}

/// A registry change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A subscription was registered. `path` is empty for managers.
    Subscribe { path: String, key: String },
    /// An unsubscribe resolved against the trie.
    Unsubscribe { path: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleKind {
        match self {
            LifecycleEvent::Subscribe { .. } => LifecycleKind::Subscribe,
            LifecycleEvent::Unsubscribe { .. } => LifecycleKind::Unsubscribe,
        }
    }
}

/// Receiver of lifecycle notifications.
pub trait LifecycleSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

/// Sink that drops every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LifecycleSink for NoopSink {
    fn emit(&self, _event: &LifecycleEvent) {}
}

/// Identifies a listener for [`LifecycleEmitter::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    once: bool,
    callback: Listener,
}

/// Named-event emitter for lifecycle notifications.
///
/// Listeners for one kind run newest first. A `once` listener is removed
/// before it is invoked, so a reentrant emit cannot run it twice.
pub struct LifecycleEmitter {
    listeners: Mutex<HashMap<LifecycleKind, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl LifecycleEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener that runs on every notification of `kind`.
    pub fn on<F>(&self, kind: LifecycleKind, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(listener))
    }

    /// Register a listener that runs once and is then removed.
    pub fn once<F>(&self, kind: LifecycleKind, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(listener))
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn off(&self, kind: LifecycleKind, id: ListenerId) {
        let mut listeners = self.listeners.lock();
        if let Some(regs) = listeners.get_mut(&kind) {
            regs.retain(|r| r.id != id);
            if regs.is_empty() {
                listeners.remove(&kind);
            }
        }
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: LifecycleKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    fn register(&self, kind: LifecycleKind, once: bool, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push(Registration { id, once, callback });
        id
    }
}

impl Default for LifecycleEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleSink for LifecycleEmitter {
    fn emit(&self, event: &LifecycleEvent) {
        let kind = event.kind();

        // Snapshot under the lock, call outside it.
        let to_call: Vec<(ListenerId, Listener)> = {
            let mut listeners = self.listeners.lock();
            let Some(regs) = listeners.get_mut(&kind) else {
                return;
            };
            let snapshot = regs
                .iter()
                .rev()
                .map(|r| (r.id, Arc::clone(&r.callback)))
                .collect();
            regs.retain(|r| !r.once);
            if regs.is_empty() {
                listeners.remove(&kind);
            }
            snapshot
        };

        for (id, callback) in to_call {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(listener_id = id.0, kind = kind.name(), "Lifecycle listener panicked");
            }
        }
    }
}

impl<T: LifecycleSink + ?Sized> LifecycleSink for Arc<T> {
    fn emit(&self, event: &LifecycleEvent) {
        (**self).emit(event)
    }
}
