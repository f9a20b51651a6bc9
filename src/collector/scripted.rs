//! Source that replays a fixed sequence of observations.
//!
//! Each call to `observe` consumes the next step. Once the script is
//! exhausted the last observation keeps being reported, which mirrors a
//! window that simply stays focused.

use super::{SourceError, WindowObservation, WindowSource};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted tick.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Observe(WindowObservation),
    Nothing,
    Fail(String),
}

#[derive(Debug)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<ScriptStep>>,
    last: Mutex<Option<WindowObservation>>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    /// Build a script that observes each window once, in order.
    pub fn from_observations(observations: impl IntoIterator<Item = WindowObservation>) -> Self {
        Self::new(observations.into_iter().map(ScriptStep::Observe))
    }

    /// Append a step to the end of the script.
    pub fn push(&self, step: ScriptStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    /// Number of steps not yet replayed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl WindowSource for ScriptedSource {
    async fn observe(&self) -> Result<Option<WindowObservation>, SourceError> {
        let step = self
            .steps
            .lock()
            .map_err(|e| SourceError::Other(e.to_string()))?
            .pop_front();

        let mut last = self
            .last
            .lock()
            .map_err(|e| SourceError::Other(e.to_string()))?;

        match step {
            Some(ScriptStep::Observe(obs)) => {
                *last = Some(obs.clone());
                Ok(Some(obs))
            }
            Some(ScriptStep::Nothing) => Ok(None),
            Some(ScriptStep::Fail(msg)) => Err(SourceError::Other(msg)),
            None => Ok(last.clone()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_holds_last() {
        let source = ScriptedSource::new([
            ScriptStep::Observe(WindowObservation::new("a", "A")),
            ScriptStep::Fail("window server unavailable".into()),
            ScriptStep::Nothing,
        ]);

        assert_eq!(source.observe().await.unwrap().unwrap().title, "a");
        assert!(source.observe().await.is_err());
        assert!(source.observe().await.unwrap().is_none());
        assert_eq!(source.remaining(), 0);
        assert_eq!(source.observe().await.unwrap().unwrap().title, "a");
    }
}
