//! Callback registry

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

use super::TracePacket;

/// Callback receiving decoded batches
pub type SinkCallback = Arc<dyn Fn(&[TracePacket]) + Send + Sync>;

/// Handle returned by registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallbackId(u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb-{}", self.0)
    }
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that returned normally
    pub completed: usize,
    /// Callbacks that panicked
    pub panicked: usize,
}

impl DispatchReport {
    pub fn invoked(&self) -> usize {
        self.completed + self.panicked
    }
}

/// Ordered set of callbacks
///
/// Dispatch works on a snapshot of the list, so callbacks may register or
/// unregister (themselves included) while being called.
pub struct SinkRegistry {
    callbacks: RwLock<Vec<(CallbackId, SinkCallback)>>,
    next_id: AtomicU64,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&[TracePacket]) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; false if it was not registered
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub fn clear(&self) {
        self.callbacks.write().clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Call every callback with the whole batch, in registration order
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    pub fn dispatch(&self, batch: &[TracePacket]) -> DispatchReport {
        let snapshot: Vec<(CallbackId, SinkCallback)> = self.callbacks.read().clone();
        let mut report = DispatchReport::default();

        for (id, callback) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(batch))) {
                Ok(()) => report.completed += 1,
                Err(payload) => {
                    report.panicked += 1;
                    warn!(callback = %id, reason = panic_message(payload.as_ref()), "trace callback panicked");
                }
            }
        }

        report
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<CallbackId> = self.callbacks.read().iter().map(|(id, _)| *id).collect();
        f.debug_struct("SinkRegistry").field("callbacks", &ids).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
