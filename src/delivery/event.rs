//! Telemetry event types.
//!
//! Only two facts ever leave the machine: which application gained focus and
//! that a prompt was submitted to an AI tool. Prompt text is present only
//! when the user consented to its capture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The focused application changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppFocusEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub app_id: String,
}

/// A prompt was submitted to an AI tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSubmitEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Event kinds shipped to the collection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    AppFocus(AppFocusEvent),
    PromptSubmit(PromptSubmitEvent),
}

/// Why an event was rejected at the buffer boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("event has no session id")]
    MissingSessionId,
    #[error("{kind} event has no app id")]
    MissingAppId { kind: &'static str },
    #[error("unrecognized event: {0}")]
    Malformed(String),
}

impl TelemetryEvent {
    pub fn app_focus(session_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        TelemetryEvent::AppFocus(AppFocusEvent {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            app_id: app_id.into(),
        })
    }

    pub fn prompt_submit(
        session_id: impl Into<String>,
        app_id: impl Into<String>,
        prompt: Option<String>,
    ) -> Self {
        TelemetryEvent::PromptSubmit(PromptSubmitEvent {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            app_id: app_id.into(),
            prompt,
        })
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::AppFocus(_) => "app_focus",
            TelemetryEvent::PromptSubmit(_) => "prompt_submit",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            TelemetryEvent::AppFocus(e) => &e.session_id,
            TelemetryEvent::PromptSubmit(e) => &e.session_id,
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            TelemetryEvent::AppFocus(e) => &e.app_id,
            TelemetryEvent::PromptSubmit(e) => &e.app_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::AppFocus(e) => e.timestamp,
            TelemetryEvent::PromptSubmit(e) => e.timestamp,
        }
    }

    /// Check the fields every event must carry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.session_id().trim().is_empty() {
            return Err(ValidationError::MissingSessionId);
        }
        if self.app_id().trim().is_empty() {
            return Err(ValidationError::MissingAppId { kind: self.kind() });
        }
        Ok(())
    }

    /// Parse and validate an event produced outside the process.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        let event: TelemetryEvent =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_is_tagged() {
        let event = TelemetryEvent::app_focus("S1", "vscode");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "app_focus");
        assert_eq!(value["session_id"], "S1");
        assert_eq!(value["app_id"], "vscode");

        let event = TelemetryEvent::prompt_submit("S1", "chatgpt", None);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "prompt_submit");
        assert!(value.get("prompt").is_none());
    }

    #[test]
    fn test_validation() {
        assert!(TelemetryEvent::app_focus("S1", "vscode").validate().is_ok());
        assert_eq!(
            TelemetryEvent::app_focus("", "vscode").validate(),
            Err(ValidationError::MissingSessionId)
        );
        assert_eq!(
            TelemetryEvent::prompt_submit("S1", " ", None).validate(),
            Err(ValidationError::MissingAppId {
                kind: "prompt_submit"
            })
        );
    }

    #[test]
    fn test_from_json_rejects_unknown_kind() {
        let ok = TelemetryEvent::from_json(json!({
            "type": "prompt_submit",
            "session_id": "S1",
            "timestamp": "2024-01-22T10:00:01Z",
            "app_id": "claude",
            "prompt": "explain lifetimes"
        }))
        .unwrap();
        assert_eq!(ok.app_id(), "claude");

        assert!(matches!(
            TelemetryEvent::from_json(json!({
                "type": "keystroke",
                "session_id": "S1",
                "timestamp": "2024-01-22T10:00:01Z",
                "app_id": "claude"
            })),
            Err(ValidationError::Malformed(_))
        ));

        assert!(matches!(
            TelemetryEvent::from_json(json!({
                "type": "app_focus",
                "timestamp": "2024-01-22T10:00:01Z",
                "app_id": "claude"
            })),
            Err(ValidationError::Malformed(_))
        ));
    }
}
