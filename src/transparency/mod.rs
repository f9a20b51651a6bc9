//! Transparency module for the Workflow Sensor Agent.
//!
//! Tracks and exposes what the agent captured and delivered, so a proctored
//! user can see exactly how much left the machine.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditedSink, SharedTransparencyLog,
    TransparencyLog, TransparencyStats,
};
