//! Configuration for the Workflow Sensor Agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the sensor agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the focused window is sampled
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Batching and retry policy for outgoing events
    pub buffer: BufferConfig,

    /// Prompt submission detection settings
    pub detector: DetectorConfig,

    /// Command printing the focused window as JSON (argv form)
    pub source_command: Option<Vec<String>>,

    /// Path where delivered batches are written when no gateway is used
    pub export_path: PathBuf,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,

    /// Whether collection is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("workflow-sensor-agent");

        Self {
            poll_interval: Duration::from_millis(1000),
            buffer: BufferConfig::default(),
            detector: DetectorConfig::default(),
            source_command: None,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the monitor or buffer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        self.buffer.validate()
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("workflow-sensor-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Batching, retry and capacity policy of the delivery buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Events per batch; a full batch is sent immediately
    pub batch_size: usize,
    /// Longest a partial batch waits before it is sent anyway
    #[serde(with = "duration_ms")]
    pub max_batch_wait: Duration,
    /// Failed attempts tolerated before an event is dropped
    pub max_retries: u32,
    /// Backoff unit; the n-th retry waits `base * 2^min(n, 5)`
    #[serde(with = "duration_ms")]
    pub retry_base_delay: Duration,
    /// Pending queue capacity; the oldest event is evicted on overflow
    pub max_queue_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_batch_wait: Duration::from_millis(5000),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            max_queue_size: 1000,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("max_queue_size must be at least 1".into()));
        }
        if self.max_queue_size < self.batch_size {
            return Err(ConfigError::Invalid(format!(
                "max_queue_size ({}) is smaller than batch_size ({})",
                self.max_queue_size, self.batch_size
            )));
        }
        Ok(())
    }
}

/// Prompt submission detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Include the prompt text in submission events. Requires explicit consent.
    pub capture_prompt_text: bool,
    /// Quiet period before the live word count is recomputed
    #[serde(with = "duration_ms")]
    pub word_count_debounce: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            capture_prompt_text: false,
            word_count_debounce: Duration::from_millis(100),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.buffer.batch_size, 10);
        assert_eq!(config.buffer.max_retries, 3);
        assert!(!config.detector.capture_prompt_text);
        assert!(!config.paused);
        assert!(config.buffer.validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = Config::from_json(
            r#"{"poll_interval": 250, "buffer": {"batch_size": 1, "max_batch_wait": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.buffer.batch_size, 1);
        assert_eq!(config.buffer.max_batch_wait, Duration::from_millis(10));
        assert_eq!(config.buffer.max_queue_size, 1000);
        assert_eq!(config.detector.word_count_debounce, Duration::from_millis(100));
    }

    #[test]
    fn test_round_trip_keeps_millis() {
        let mut config = Config::default();
        config.buffer.retry_base_delay = Duration::from_millis(1500);
        let json = serde_json::to_string(&config).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.buffer, config.buffer);
    }

    #[test]
    fn test_invalid_buffer_config() {
        assert!(matches!(
            Config::from_json(r#"{"buffer": {"batch_size": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"buffer": {"batch_size": 20, "max_queue_size": 5}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(Config::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let result = Config::from_json(r#"{"poll_interval": 0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let config = Config::from_json(r#"{"poll_interval": 250}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
