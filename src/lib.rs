//! Workflow Sensor Agent - privacy-first workflow telemetry for proctored sessions.
//!
//! This library watches which application has focus and when a prompt is
//! sent to an AI tool, and reliably ships those two facts to a collection
//! service, even across brief connectivity loss.
//!
//! # Privacy Guarantees
//!
//! - **No keystrokes**: Key presses are inspected only to spot a submit gesture
//! - **No screen content**: Window titles are classified locally and discarded
//! - **No prompt text** unless capture was explicitly consented to
//! - **Transparency**: All collection is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Workflow Sensor Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐        │
//! │  │WindowSource │──▶│ FocusMonitor │──▶│             │        │
//! │  │ (collector) │   │ (signatures) │   │  Delivery   │──▶ Sink │
//! │  └─────────────┘   └──────────────┘   │   Buffer    │        │
//! │  ┌─────────────┐   ┌──────────────┐   │             │        │
//! │  │InputContext │──▶│PromptDetector│──▶│             │        │
//! │  └─────────────┘   └──────────────┘   └─────────────┘        │
//! │                          │                   │                │
//! │                          ▼                   ▼                │
//! │                   ┌─────────────────────────────┐             │
//! │                   │      Transparency Log        │             │
//! │                   └─────────────────────────────┘             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use workflow_sensor_agent::{
//!     AppIdentifier, BufferConfig, DeliveryBuffer, FocusMonitor, JsonlSink, NoopSource,
//! };
//!
//! # async fn run() {
//! let buffer = DeliveryBuffer::new(
//!     BufferConfig::default(),
//!     Arc::new(JsonlSink::new("batches.jsonl")),
//! )
//! .expect("default buffer config is valid");
//! buffer.set_session("session-42");
//!
//! let monitor = FocusMonitor::new(
//!     Arc::new(NoopSource::new()),
//!     Arc::new(AppIdentifier::builtin()),
//!     buffer.clone(),
//! );
//! monitor.start("session-42", Duration::from_secs(1));
//! # monitor.stop();
//! # buffer.flush().await;
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod delivery;
pub mod monitor;
pub mod notify;
pub mod signatures;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{CommandSource, NoopSource, ScriptedSource, WindowObservation, WindowSource};
pub use config::{BufferConfig, Config, ConfigError, DetectorConfig};
pub use delivery::{
    BufferStats, DeliveryBuffer, DeliveryError, DeliverySink, JsonlSink, MemorySink,
    TelemetryEvent, ValidationError,
};
pub use monitor::{FocusChange, FocusMonitor, InputContext, PageEvent, PromptDetector};
pub use signatures::{AppIdentifier, SignatureRegistry, UNKNOWN_APP};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "gateway")]
pub use delivery::{GatewayConfig, HttpSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          WORKFLOW SENSOR AGENT - PRIVACY DECLARATION             ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records your workflow during a proctored session.    ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • Which application is focused (a short name, e.g. "vscode")  ║
║    • When a prompt is submitted to an AI tool                    ║
║    • Prompt text, ONLY if you explicitly consented to it         ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Which keys you press (no passwords, messages, etc.)         ║
║    • Window titles or page addresses                             ║
║    • Any screen content                                          ║
║                                                                  ║
║  Window titles are classified locally and discarded at once.     ║
║  Undelivered events are never written to disk.                   ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    workflow-sensor status                                        ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER CAPTURE"));
        assert!(PRIVACY_DECLARATION.contains("keys you press"));
        assert!(PRIVACY_DECLARATION.contains("consented"));
    }
}
