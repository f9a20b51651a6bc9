//! Source backed by an external command.
//!
//! The command is run once per tick and must print a single JSON object
//! (`{"title": ..., "process": ..., "url": ...}`) on stdout. Empty output
//! means nothing is focused. This keeps platform window APIs out of the
//! agent: any helper script (AppleScript, xdotool, PowerShell) can feed it.

use super::{SourceError, WindowObservation, WindowSource};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build from an argv vector (`["osascript", "front.scpt"]`).
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Parse the stdout of an observation command.
pub fn parse_observation(stdout: &str) -> Result<Option<WindowObservation>, SourceError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| SourceError::Parse(e.to_string()))
}

#[async_trait]
impl WindowSource for CommandSource {
    async fn observe(&self) -> Result<Option<WindowObservation>, SourceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| SourceError::Timeout)?
            .map_err(|e| SourceError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_observation(&String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_observation() {
        assert!(parse_observation("").unwrap().is_none());
        assert!(parse_observation("\n  ").unwrap().is_none());

        let obs = parse_observation(r#"{"title":"Visual Studio Code","process":"Code"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(obs.title, "Visual Studio Code");
        assert_eq!(obs.url, None);

        assert!(matches!(
            parse_observation("not json"),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_from_argv() {
        assert!(CommandSource::from_argv(&[]).is_none());
        let source = CommandSource::from_argv(&["echo".to_string(), "{}".to_string()]).unwrap();
        assert_eq!(source.name(), "echo");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_observe_runs_command() {
        let source = CommandSource::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"echo '{"title":"Terminal","process":"Terminal"}'"#.to_string(),
            ],
        );
        let obs = source.observe().await.unwrap().unwrap();
        assert_eq!(obs.process, "Terminal");

        let failing = CommandSource::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        assert!(matches!(
            failing.observe().await,
            Err(SourceError::CommandFailed { .. })
        ));
    }
}
