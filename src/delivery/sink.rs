//! Delivery sinks: where batches go once they leave the buffer.
//!
//! The buffer guarantees at-least-once delivery with bounded retries, so a
//! sink must tolerate seeing the same batch more than once. Timeouts are
//! the sink's own concern.

use super::event::TelemetryEvent;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

/// Sink failure. Every variant is retried by the buffer.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

/// External collaborator receiving batches.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, events: &[TelemetryEvent], session_id: &str) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<S: DeliverySink + ?Sized> DeliverySink for Arc<S> {
    async fn send(&self, events: &[TelemetryEvent], session_id: &str) -> Result<(), DeliveryError> {
        (**self).send(events, session_id).await
    }
}

/// One delivered batch, as written by [`JsonlSink`].
#[derive(Debug, Serialize)]
struct BatchRecord<'a> {
    session_id: &'a str,
    sent_at: String,
    event_count: usize,
    events: &'a [TelemetryEvent],
}

/// Appends each batch as one JSON line to a local file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeliverySink for JsonlSink {
    async fn send(&self, events: &[TelemetryEvent], session_id: &str) -> Result<(), DeliveryError> {
        let record = BatchRecord {
            session_id,
            sent_at: Utc::now().to_rfc3339(),
            event_count: events.len(),
            events,
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps delivered batches in memory. Can be told to fail the next few
/// sends, which makes it useful for demos and tests of the retry path.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(String, Vec<TelemetryEvent>)>>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with a network error.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Send attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted batches in delivery order.
    pub fn batches(&self) -> Vec<Vec<TelemetryEvent>> {
        self.lock().iter().map(|(_, events)| events.clone()).collect()
    }

    /// Every accepted event, flattened in delivery order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.lock()
            .iter()
            .flat_map(|(_, events)| events.iter().cloned())
            .collect()
    }

    /// Session ids the accepted batches were sent under.
    pub fn sessions(&self) -> Vec<String> {
        self.lock().iter().map(|(session, _)| session.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Vec<TelemetryEvent>)>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn send(&self, events: &[TelemetryEvent], session_id: &str) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Network("simulated outage".into()));
        }
        self.lock().push((session_id.to_string(), events.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_sink_appends_one_line_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("out").join("batches.jsonl"));

        let batch = vec![
            TelemetryEvent::app_focus("S1", "vscode"),
            TelemetryEvent::app_focus("S1", "chatgpt"),
        ];
        sink.send(&batch, "S1").await.unwrap();
        sink.send(&batch[..1], "S1").await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_count"], 2);
        assert_eq!(lines[0]["events"][1]["app_id"], "chatgpt");
        assert_eq!(lines[1]["session_id"], "S1");
    }

    #[tokio::test]
    async fn test_memory_sink_fails_then_records() {
        let sink = MemorySink::new();
        sink.fail_next(1);
        let batch = vec![TelemetryEvent::app_focus("S1", "xcode")];

        assert!(sink.send(&batch, "S1").await.is_err());
        assert!(sink.send(&batch, "S1").await.is_ok());
        assert_eq!(sink.attempts(), 2);
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.events()[0].app_id(), "xcode");
        assert_eq!(sink.sessions(), vec!["S1".to_string()]);
    }
}
