//! Source that never observes anything.
//!
//! Used when no observation command is configured so the agent (and the
//! prompt pipeline) can still run without a platform window source.

use super::{SourceError, WindowObservation, WindowSource};
use async_trait::async_trait;

/// A noop source that reports an empty desktop on every tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSource;

impl NoopSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WindowSource for NoopSource {
    async fn observe(&self) -> Result<Option<WindowObservation>, SourceError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "noop"
    }
}
