//! Page input model consumed by the prompt detector.
//!
//! A page-side producer (browser extension content script, embedded web
//! view) forwards key presses and focus/input activity as [`PageEvent`]s.
//! Each event carries a snapshot of its target element so the detector can
//! run its heuristics without access to a live document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// The element an event was dispatched to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSnapshot {
    /// Stable identity of the node within the page.
    pub node_id: u64,
    /// Lowercase tag name (`textarea`, `input`, `div`, ...).
    pub tag: String,
    /// The `type` attribute of `<input>` elements.
    pub input_type: Option<String>,
    pub id: Option<String>,
    pub class: Option<String>,
    pub name: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub role: Option<String>,
    pub contenteditable: bool,
    /// Remaining attributes, e.g. `data-testid`.
    pub attributes: BTreeMap<String, String>,
    /// Current value or text content.
    pub text: String,
}

impl ElementSnapshot {
    pub fn new(node_id: u64, tag: impl Into<String>) -> Self {
        Self {
            node_id,
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_aria_label(mut self, label: impl Into<String>) -> Self {
        self.aria_label = Some(label.into());
        self
    }

    pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn editable(mut self) -> Self {
        self.contenteditable = true;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the element's class list contains `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.class
            .as_deref()
            .is_some_and(|c| c.split_whitespace().any(|token| token == class))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.meta || self.shift || self.alt)
    }
}

/// A key-down event. Only the key name is kept for submit detection; the
/// detector never records it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    /// True while an IME composition is in progress.
    #[serde(default)]
    pub is_composing: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
            is_composing: false,
        }
    }

    pub fn enter() -> Self {
        Self::new("Enter", Modifiers::none())
    }

    pub fn ctrl_enter() -> Self {
        Self::new(
            "Enter",
            Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEventKind {
    KeyDown { key: KeyPress },
    Input,
    Focus,
    Blur,
}

/// One input event observed in a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEvent {
    /// Hostname of the page the event came from.
    pub hostname: String,
    #[serde(flatten)]
    pub kind: PageEventKind,
    pub target: ElementSnapshot,
}

impl PageEvent {
    pub fn key_down(hostname: impl Into<String>, target: ElementSnapshot, key: KeyPress) -> Self {
        Self {
            hostname: hostname.into(),
            kind: PageEventKind::KeyDown { key },
            target,
        }
    }

    pub fn input(hostname: impl Into<String>, target: ElementSnapshot) -> Self {
        Self {
            hostname: hostname.into(),
            kind: PageEventKind::Input,
            target,
        }
    }

    pub fn focus(hostname: impl Into<String>, target: ElementSnapshot) -> Self {
        Self {
            hostname: hostname.into(),
            kind: PageEventKind::Focus,
            target,
        }
    }

    pub fn blur(hostname: impl Into<String>, target: ElementSnapshot) -> Self {
        Self {
            hostname: hostname.into(),
            kind: PageEventKind::Blur,
            target,
        }
    }
}

/// Shared document-level input context. Every attached detector sees every
/// dispatched event, in dispatch order.
#[derive(Debug, Clone)]
pub struct InputContext {
    tx: broadcast::Sender<PageEvent>,
}

impl InputContext {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Dispatch an event to every attached listener. Returns how many
    /// received it; zero when nothing is attached.
    pub fn dispatch(&self, event: PageEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InputContext {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_event_wire_format() {
        let event = PageEvent::key_down(
            "chatgpt.com",
            ElementSnapshot::new(7, "TEXTAREA").with_id("prompt-textarea"),
            KeyPress::enter(),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "key_down");
        assert_eq!(value["key"]["key"], "Enter");
        assert_eq!(value["target"]["tag"], "textarea");

        let parsed: PageEvent = serde_json::from_value(serde_json::json!({
            "hostname": "claude.ai",
            "type": "input",
            "target": {"node_id": 3, "tag": "div", "contenteditable": true, "text": "hi"}
        }))
        .unwrap();
        assert_eq!(parsed.kind, PageEventKind::Input);
        assert!(parsed.target.contenteditable);
    }

    #[test]
    fn test_class_tokens() {
        let el = ElementSnapshot::new(1, "div").with_class("ProseMirror break-words");
        assert!(el.has_class("ProseMirror"));
        assert!(!el.has_class("Prose"));
    }

    #[tokio::test]
    async fn test_dispatch_without_listeners() {
        let ctx = InputContext::default();
        assert_eq!(
            ctx.dispatch(PageEvent::focus("x.com", ElementSnapshot::new(1, "input"))),
            0
        );

        let mut rx = ctx.subscribe();
        assert_eq!(ctx.listener_count(), 1);
        ctx.dispatch(PageEvent::blur("x.com", ElementSnapshot::new(1, "input")));
        assert_eq!(rx.recv().await.unwrap().kind, PageEventKind::Blur);
    }
}
