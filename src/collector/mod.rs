//! Window observation sources for the Workflow Sensor Agent.
//!
//! A source is polled once per monitor tick and returns at most one
//! observation of the foreground window. Sources may fail; the monitor logs
//! the failure and keeps polling.

pub mod command;
pub mod noop;
pub mod scripted;
pub mod types;

use async_trait::async_trait;

// Re-export commonly used types
pub use command::CommandSource;
pub use noop::NoopSource;
pub use scripted::{ScriptStep, ScriptedSource};
pub use types::WindowObservation;

/// Errors that can occur while observing the foreground window.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to run observation command: {0}")]
    Spawn(String),
    #[error("Observation command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("Observation command timed out")]
    Timeout,
    #[error("Malformed observation: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

/// External collaborator producing foreground window observations.
///
/// `Ok(None)` means "nothing to observe this tick" (e.g. the desktop has
/// focus); it is not an error.
#[async_trait]
pub trait WindowSource: Send + Sync {
    async fn observe(&self) -> Result<Option<WindowObservation>, SourceError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "window-source"
    }
}
