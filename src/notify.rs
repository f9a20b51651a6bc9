//! Ordered listener lists with per-listener error isolation.
//!
//! The monitor and the detector push live updates (focus changes, word
//! counts) to whatever UI layer subscribed. Delivery is fire-and-forget: a
//! listener that returns an error or panics is logged and skipped, and the
//! remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

/// Handle returned by [`Listeners::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

pub struct Listeners<T> {
    name: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Callback<T>)>>,
}

impl<T> Listeners<T> {
    /// `name` identifies the channel in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener. Listeners run in subscription order.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, Arc::new(callback)));
        }
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|(entry_id, _)| *entry_id != id);
                entries.len() != before
            }
            Err(_) => false,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `value`. Returns how many failed.
    pub fn emit(&self, value: &T) -> usize {
        // Snapshot so listeners may (un)subscribe from inside a callback.
        let snapshot: Vec<(ListenerId, Callback<T>)> = match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => return 0,
        };

        let mut failures = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(channel = self.name, listener = id.0, "listener failed: {e:#}");
                }
                Err(_) => {
                    failures += 1;
                    error!(channel = self.name, listener = id.0, "listener panicked");
                }
            }
        }
        failures
    }
}
