//! Batching delivery buffer with retry and backoff.
//!
//! Events are validated, queued, and shipped to a [`DeliverySink`] in
//! batches. A batch is sent as soon as the queue holds `batch_size` events,
//! or after `max_batch_wait` for a partial batch. Failed batches are retried
//! with capped exponential backoff and dropped once `max_retries` is
//! exceeded.
//!
//! Invariants:
//! - at most one batch is in flight
//! - at most one retry timer is armed
//! - nothing is sent while offline or before a session id is known; queued
//!   events stay parked in both cases
//! - the pending queue never exceeds `max_queue_size`; overflow evicts the
//!   oldest event

use super::event::TelemetryEvent;
use super::schedule::TimerSlot;
use super::sink::DeliverySink;
use crate::config::{BufferConfig, ConfigError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Backoff exponent cap: the longest wait is `retry_base_delay * 32`.
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// An event waiting in one of the buffer queues.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event: TelemetryEvent,
    /// Failed delivery attempts so far
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl QueuedEvent {
    fn new(event: TelemetryEvent) -> Self {
        Self {
            event,
            retry_count: 0,
            last_error: None,
        }
    }
}

/// Point-in-time view of the buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferStats {
    pub pending: usize,
    pub failed: usize,
    pub in_flight: bool,
    pub online: bool,
    pub session_id: Option<String>,
    pub retry_scheduled: bool,
    /// Events acknowledged by the sink
    pub sent: u64,
    /// Batches the sink rejected
    pub failed_attempts: u64,
    pub dropped_after_retries: u64,
    pub dropped_on_overflow: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: u64,
    failed_attempts: u64,
    dropped_after_retries: u64,
    dropped_on_overflow: u64,
    rejected: u64,
}

#[derive(Debug)]
struct BufferState {
    pending: VecDeque<QueuedEvent>,
    failed: VecDeque<QueuedEvent>,
    online: bool,
    in_flight: bool,
    session_id: Option<String>,
    /// Bumped by `clear`; results of sends started earlier are discarded.
    generation: u64,
    batch_timer: TimerSlot,
    retry_timer: TimerSlot,
    counters: Counters,
}

impl BufferState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            failed: VecDeque::new(),
            online: true,
            in_flight: false,
            session_id: None,
            generation: 0,
            batch_timer: TimerSlot::new(),
            retry_timer: TimerSlot::new(),
            counters: Counters::default(),
        }
    }

    fn can_send(&self) -> bool {
        self.online && self.session_id.is_some()
    }

    fn evict_overflow(&mut self, max_queue_size: usize) {
        while self.pending.len() > max_queue_size {
            if let Some(evicted) = self.pending.pop_front() {
                self.counters.dropped_on_overflow += 1;
                warn!(
                    kind = evicted.event.kind(),
                    app = evicted.event.app_id(),
                    "queue full, dropping oldest event"
                );
            }
        }
    }

    /// Move failed events back to the front of the pending queue, keeping
    /// their relative order.
    fn requeue_failed(&mut self, max_queue_size: usize) {
        let count = self.failed.len();
        while let Some(event) = self.failed.pop_back() {
            self.pending.push_front(event);
        }
        if count > 0 {
            debug!(count, "requeued failed events for retry");
        }
        self.evict_overflow(max_queue_size);
    }

    fn record_failure(&mut self, batch: Vec<QueuedEvent>, error: String, max_retries: u32) {
        self.counters.failed_attempts += 1;

        let mut dropped = 0u64;
        let mut retrying = 0usize;
        for mut queued in batch {
            queued.retry_count += 1;
            queued.last_error = Some(error.clone());
            if queued.retry_count > max_retries {
                dropped += 1;
            } else {
                retrying += 1;
                self.failed.push_back(queued);
            }
        }

        self.counters.dropped_after_retries += dropped;
        warn!(%error, retrying, dropped, "batch delivery failed");
        if dropped > 0 {
            warn!(dropped, max_retries, "dropping events after exhausting retries");
        }
    }
}

struct Inner {
    config: BufferConfig,
    sink: Arc<dyn DeliverySink>,
    state: Mutex<BufferState>,
    /// Signalled whenever a send completes or the buffer is cleared.
    settled: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send now if a full batch is waiting, otherwise (re)arm the batch timer.
    fn kick(self: &Arc<Self>, state: &mut BufferState) {
        if !state.can_send() || state.pending.is_empty() {
            return;
        }
        if state.pending.len() >= self.config.batch_size {
            tokio::spawn(Arc::clone(self).send_next_batch());
        } else {
            let inner = Arc::clone(self);
            state
                .batch_timer
                .schedule(self.config.max_batch_wait, move |tag| async move {
                    inner.lock().batch_timer.disarm(tag);
                    tokio::spawn(inner.send_next_batch());
                });
        }
    }

    /// Arm the retry timer for the failed queue, unless one is armed already.
    fn schedule_retry(self: &Arc<Self>, state: &mut BufferState) {
        if state.failed.is_empty() || !state.online || state.retry_timer.is_armed() {
            return;
        }

        let exponent = state
            .failed
            .front()
            .map_or(0, |q| q.retry_count)
            .min(MAX_BACKOFF_EXPONENT);
        let delay = self.config.retry_base_delay * 2u32.pow(exponent);
        debug!(
            delay_ms = delay.as_millis() as u64,
            failed = state.failed.len(),
            "scheduling retry"
        );

        let inner = Arc::clone(self);
        state.retry_timer.schedule(delay, move |tag| async move {
            let mut state = inner.lock();
            if !state.retry_timer.disarm(tag) || !state.online {
                return;
            }
            state.requeue_failed(inner.config.max_queue_size);
            drop(state);
            tokio::spawn(inner.send_next_batch());
        });
    }

    /// Take up to one batch from the front of the queue and hand it to the sink.
    async fn send_next_batch(self: Arc<Self>) {
        let (batch, session_id, generation) = {
            let mut state = self.lock();
            if state.in_flight || !state.online || state.pending.is_empty() {
                return;
            }
            let Some(session_id) = state.session_id.clone() else {
                debug!(pending = state.pending.len(), "no session yet, keeping events queued");
                return;
            };

            state.batch_timer.cancel();
            state.in_flight = true;
            let count = state.pending.len().min(self.config.batch_size);
            let batch: Vec<QueuedEvent> = state.pending.drain(..count).collect();
            (batch, session_id, state.generation)
        };

        let events: Vec<TelemetryEvent> = batch.iter().map(|q| q.event.clone()).collect();
        debug!(count = events.len(), session = %session_id, "sending batch");
        let result = self.sink.send(&events, &session_id).await;

        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.generation != generation {
                debug!("discarding delivery result from a cleared buffer");
            } else {
                state.in_flight = false;
                match result {
                    Ok(()) => {
                        state.counters.sent += events.len() as u64;
                        debug!(count = events.len(), "batch delivered");
                    }
                    Err(e) => {
                        state.record_failure(batch, e.to_string(), self.config.max_retries);
                    }
                }
                self.kick(state);
                self.schedule_retry(state);
            }
        }
        self.settled.notify_waiters();
    }
}

enum FlushStep {
    Send,
    Wait,
    Done,
}

/// Handle to a delivery buffer. Clones share the same queues.
///
/// All methods that may schedule work must be called from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct DeliveryBuffer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DeliveryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryBuffer")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl DeliveryBuffer {
    /// Create a buffer. It starts online with no session; events queue up
    /// until [`set_session`](Self::set_session) is called.
    ///
    /// Fails if `config` does not pass [`BufferConfig::validate`].
    pub fn new(config: BufferConfig, sink: Arc<dyn DeliverySink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sink,
                state: Mutex::new(BufferState::new()),
                settled: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.inner.config
    }

    /// Queue one event. Returns `false` if it failed validation.
    pub fn add_event(&self, event: TelemetryEvent) -> bool {
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        if let Err(e) = event.validate() {
            state.counters.rejected += 1;
            debug!(error = %e, kind = event.kind(), "rejecting invalid event");
            return false;
        }

        state.pending.push_back(QueuedEvent::new(event));
        state.evict_overflow(self.inner.config.max_queue_size);
        self.inner.kick(state);
        true
    }

    /// Queue several events. Returns how many were accepted.
    pub fn add_events(&self, events: impl IntoIterator<Item = TelemetryEvent>) -> usize {
        events
            .into_iter()
            .filter(|event| self.add_event(event.clone()))
            .count()
    }

    /// Queue an event produced outside the process (JSON with a `type` tag).
    pub fn add_raw(&self, value: serde_json::Value) -> bool {
        match TelemetryEvent::from_json(value) {
            Ok(event) => self.add_event(event),
            Err(e) => {
                self.inner.lock().counters.rejected += 1;
                debug!(error = %e, "rejecting raw event");
                false
            }
        }
    }

    /// Attach the buffer to a session. Parked events start flowing.
    pub fn set_session(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        info!(session = %session_id, "delivery session set");
        state.session_id = Some(session_id);
        self.inner.kick(state);
        self.inner.schedule_retry(state);
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }

    /// Switch connectivity. Going offline suspends timers without dropping
    /// anything; coming online resumes batching and retries.
    pub fn set_online(&self, online: bool) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if state.online != online {
            info!(online, pending = state.pending.len(), failed = state.failed.len(), "connectivity changed");
        }
        state.online = online;

        if online {
            self.inner.kick(state);
            self.inner.schedule_retry(state);
        } else {
            state.batch_timer.cancel();
            state.retry_timer.cancel();
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().online
    }

    /// Deliver everything queued, including failed events, retrying
    /// immediately until each event is delivered or exhausts its retries.
    ///
    /// Returns early if the buffer is offline or has no session. Sends run
    /// on their own tasks, so dropping this future (e.g. under a timeout)
    /// leaves a batch in flight to finish and settle normally.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = {
                let mut state = self.inner.lock();
                if !state.can_send() {
                    FlushStep::Done
                } else if state.in_flight {
                    FlushStep::Wait
                } else if !state.pending.is_empty() {
                    FlushStep::Send
                } else if !state.failed.is_empty() {
                    state.retry_timer.cancel();
                    state.requeue_failed(self.inner.config.max_queue_size);
                    FlushStep::Send
                } else {
                    FlushStep::Done
                }
            };

            match step {
                FlushStep::Send => {
                    let send = tokio::spawn(Arc::clone(&self.inner).send_next_batch());
                    if let Err(e) = send.await {
                        warn!(error = %e, "flush send task failed");
                        break;
                    }
                }
                FlushStep::Wait => notified.await,
                FlushStep::Done => break,
            }
        }

        let stats = self.stats();
        debug!(pending = stats.pending, failed = stats.failed, "flush finished");
    }

    /// Drop every queued event, cancel timers and forget the session.
    pub fn clear(&self) {
        {
            let mut state = self.inner.lock();
            let discarded = state.pending.len() + state.failed.len();
            state.pending.clear();
            state.failed.clear();
            state.batch_timer.cancel();
            state.retry_timer.cancel();
            state.in_flight = false;
            state.session_id = None;
            state.generation += 1;
            info!(discarded, "delivery buffer cleared");
        }
        self.inner.settled.notify_waiters();
    }

    /// Cancel all timers, keeping queued events for a final `flush`.
    pub fn cleanup(&self) {
        let mut state = self.inner.lock();
        state.batch_timer.cancel();
        state.retry_timer.cancel();
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.inner.lock();
        BufferStats {
            pending: state.pending.len(),
            failed: state.failed.len(),
            in_flight: state.in_flight,
            online: state.online,
            session_id: state.session_id.clone(),
            retry_scheduled: state.retry_timer.is_armed(),
            sent: state.counters.sent,
            failed_attempts: state.counters.failed_attempts,
            dropped_after_retries: state.counters.dropped_after_retries,
            dropped_on_overflow: state.counters.dropped_on_overflow,
            rejected: state.counters.rejected,
        }
    }

    /// Events waiting to be sent, front first.
    pub fn pending_events(&self) -> Vec<QueuedEvent> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    /// Events waiting for their retry timer, front first.
    pub fn failed_events(&self) -> Vec<QueuedEvent> {
        self.inner.lock().failed.iter().cloned().collect()
    }
}
