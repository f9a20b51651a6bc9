//! Privacy-preserving transparency log.
//!
//! Counts what the agent captured and shipped so the user can audit it.
//! Only counts are kept; no application names, titles or prompt text.

use crate::delivery::{DeliveryError, DeliverySink, TelemetryEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of focus changes emitted
    focus_events: AtomicU64,
    /// Number of prompt submissions detected
    prompt_submissions: AtomicU64,
    /// Number of batches accepted by the sink
    batches_delivered: AtomicU64,
    /// Number of events inside those batches
    events_delivered: AtomicU64,
    /// Number of events lost to retry exhaustion or queue overflow
    events_dropped: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            focus_events: AtomicU64::new(0),
            prompt_submissions: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log that loads and saves its counters at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_focus_event(&self) {
        self.focus_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prompt_submission(&self) {
        self.prompt_submissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one batch of `events` events accepted by the sink.
    pub fn record_batch_delivered(&self, events: u64) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.events_delivered.fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_events_dropped(&self, count: u64) {
        self.events_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            focus_events: self.focus_events.load(Ordering::Relaxed),
            prompt_submissions: self.prompt_submissions.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Focus changes recorded: {}\n\
             - Prompt submissions recorded: {}\n\
             - Batches delivered: {}\n\
             - Events delivered: {}\n\
             - Events dropped: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No keystrokes captured\n\
             - No screen content captured\n\
             - Prompt text only with explicit consent",
            stats.focus_events,
            stats.prompt_submissions,
            stats.batches_delivered,
            stats.events_delivered,
            stats.events_dropped,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                focus_events: stats.focus_events,
                prompt_submissions: stats.prompt_submissions,
                batches_delivered: stats.batches_delivered,
                events_delivered: stats.events_delivered,
                events_dropped: stats.events_dropped,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.focus_events
                    .store(persisted.focus_events, Ordering::Relaxed);
                self.prompt_submissions
                    .store(persisted.prompt_submissions, Ordering::Relaxed);
                self.batches_delivered
                    .store(persisted.batches_delivered, Ordering::Relaxed);
                self.events_delivered
                    .store(persisted.events_delivered, Ordering::Relaxed);
                self.events_dropped
                    .store(persisted.events_dropped, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.focus_events.store(0, Ordering::Relaxed);
        self.prompt_submissions.store(0, Ordering::Relaxed);
        self.batches_delivered.store(0, Ordering::Relaxed);
        self.events_delivered.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub focus_events: u64,
    pub prompt_submissions: u64,
    pub batches_delivered: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    focus_events: u64,
    #[serde(default)]
    prompt_submissions: u64,
    #[serde(default)]
    batches_delivered: u64,
    #[serde(default)]
    events_delivered: u64,
    #[serde(default)]
    events_dropped: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

/// Sink wrapper that counts every batch the inner sink accepts.
pub struct AuditedSink<S> {
    inner: S,
    log: SharedTransparencyLog,
}

impl<S> AuditedSink<S> {
    pub fn new(inner: S, log: SharedTransparencyLog) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl<S: DeliverySink> DeliverySink for AuditedSink<S> {
    async fn send(&self, events: &[TelemetryEvent], session_id: &str) -> Result<(), DeliveryError> {
        self.inner.send(events, session_id).await?;
        self.log.record_batch_delivered(events.len() as u64);
        Ok(())
    }
}
