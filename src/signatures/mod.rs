//! Application identification for the Workflow Sensor Agent.
//!
//! This module contains:
//! - The declarative signature table and its compiled registry
//! - The classifier mapping a window observation to an app identity

pub mod identify;
pub mod registry;

// Re-export commonly used types
pub use identify::{AppIdentifier, UNKNOWN_APP};
pub use registry::{
    AppSignature, RegistryError, SignatureKind, SignatureRegistry, SignatureSpec,
    BUILTIN_SIGNATURES,
};
