//! Cancelable delayed tasks.
//!
//! A [`TimerSlot`] holds at most one scheduled task. Scheduling replaces
//! (and aborts) whatever was there; cancelling an empty slot is a no-op.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Identifies one scheduled task within its slot.
pub type TimerTag = u64;

#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    /// Tag of the task in `handle`; bumped on every `schedule`.
    tag: TimerTag,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the future built by `task` after `delay`, replacing any task
    /// already in the slot. `task` receives the tag to pass to
    /// [`disarm`](Self::disarm) once it fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, task: F) -> TimerTag
    where
        F: FnOnce(TimerTag) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.tag = self.tag.wrapping_add(1);
        let fut = task(self.tag);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        }));
        self.tag
    }

    /// Abort the pending task, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the task tagged `tag` without aborting it. Called by the task
    /// itself once it fires, so the slot can be armed again. A task that was
    /// already replaced leaves its successor in place and gets `false`.
    pub fn disarm(&mut self, tag: TimerTag) -> bool {
        if self.tag != tag || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        true
    }

    /// Whether a task is scheduled and has not yet completed.
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new();

        let f = fired.clone();
        slot.schedule(Duration::from_millis(100), move |_| async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.is_armed());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_and_cancel_is_idempotent() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new();

        for _ in 0..3 {
            let f = fired.clone();
            slot.schedule(Duration::from_millis(100), move |_| async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let f = fired.clone();
        slot.schedule(Duration::from_millis(100), move |_| async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        slot.cancel();
        slot.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_disarm_keeps_the_newer_task() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new();

        let first = slot.schedule(Duration::from_millis(100), |_| async {});
        let f = fired.clone();
        let second = slot.schedule(Duration::from_millis(100), move |_| async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_ne!(first, second);

        // A late disarm from the replaced task must not orphan the new one.
        assert!(!slot.disarm(first));
        assert!(slot.is_armed());
        slot.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let third = slot.schedule(Duration::from_millis(100), |_| async {});
        assert!(slot.disarm(third));
        assert!(!slot.is_armed());
    }
}
