//! Window observation types for the Workflow Sensor Agent.
//!
//! An observation is a single snapshot of the foreground window. It is
//! classified once and then discarded.

use serde::{Deserialize, Serialize};

/// One snapshot of the foreground window (or the active page of a browser).
///
/// Privacy guarantee: only the title, owning process and URL are read.
/// No screen content or keystrokes are ever part of an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowObservation {
    /// Window title as reported by the window server
    #[serde(default)]
    pub title: String,
    /// Name of the owning process (e.g. "Code", "Google Chrome")
    #[serde(default, alias = "proc", alias = "owner")]
    pub process: String,
    /// URL of the active tab, when the window belongs to a browser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WindowObservation {
    pub fn new(title: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            process: process.into(),
            url: None,
        }
    }

    /// Attach the URL of the active browser tab.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// The URL, if one is present and non-empty.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Whether the title carries anything to classify.
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}
