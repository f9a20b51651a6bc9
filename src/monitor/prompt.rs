//! Prompt submission detection.
//!
//! Watches page input for the gestures that send a prompt to an AI tool
//! (Ctrl/Cmd+Enter in a prompt editor, plain Enter in a single-line ask
//! box) and keeps a debounced live word count of the focused prompt input.
//! Prompt text leaves the detector only when capture was consented to.

use super::input::{ElementSnapshot, InputContext, KeyPress, PageEvent, PageEventKind};
use crate::config::DetectorConfig;
use crate::delivery::{DeliveryBuffer, TelemetryEvent};
use crate::notify::{ListenerId, Listeners};
use crate::signatures::UNKNOWN_APP;
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Hostnames of AI tools, matched on the host or any subdomain of it.
const AI_HOSTS: &[(&str, &str)] = &[
    ("chat.openai.com", "chatgpt"),
    ("chatgpt.com", "chatgpt"),
    ("claude.ai", "claude"),
    ("gemini.google.com", "gemini"),
    ("bard.google.com", "gemini"),
    ("copilot.microsoft.com", "copilot"),
    ("perplexity.ai", "perplexity"),
    ("poe.com", "poe"),
    ("chat.mistral.ai", "mistral"),
    ("chat.deepseek.com", "deepseek"),
    ("huggingface.co", "huggingchat"),
];

const CHAT_KEYWORDS: &[&str] = &["prompt", "chat", "message", "ask", "question", "query"];

/// Identify the AI tool serving a page from its hostname.
pub fn app_for_hostname(hostname: &str) -> &'static str {
    let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    let host = host.split(':').next().unwrap_or_default();
    AI_HOSTS
        .iter()
        .find(|(domain, _)| {
            host == *domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
        .map(|(_, app)| *app)
        .unwrap_or(UNKNOWN_APP)
}

/// Whitespace-delimited word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_text_entry(el: &ElementSnapshot) -> bool {
    match el.tag.as_str() {
        "textarea" => true,
        "input" => matches!(
            el.input_type.as_deref().map(str::to_ascii_lowercase).as_deref(),
            None | Some("text") | Some("search")
        ),
        _ => el.contenteditable || el.role.as_deref() == Some("textbox"),
    }
}

fn mentions_chat(el: &ElementSnapshot) -> bool {
    [&el.class, &el.id, &el.placeholder, &el.aria_label, &el.name]
        .into_iter()
        .flatten()
        .map(|value| value.to_ascii_lowercase())
        .any(|value| CHAT_KEYWORDS.iter().any(|k| value.contains(k)))
}

/// Multi-line prompt editors of known AI tools, or any text entry whose
/// class, id, placeholder or label reads like a chat box.
pub fn is_prompt_input(el: &ElementSnapshot) -> bool {
    let known = el.id.as_deref() == Some("prompt-textarea")
        || (el.contenteditable && el.has_class("ProseMirror"))
        || el.tag == "rich-textarea"
        || el.has_class("ql-editor")
        || el
            .attribute("data-testid")
            .is_some_and(|v| v.contains("chat-input") || v.contains("prompt"));

    known || (is_text_entry(el) && mentions_chat(el))
}

/// Single-line "ask" inputs where plain Enter submits.
pub fn is_ask_input(el: &ElementSnapshot) -> bool {
    if el.tag != "input" || !is_text_entry(el) {
        return false;
    }
    let labelled_ask = [&el.placeholder, &el.aria_label]
        .into_iter()
        .flatten()
        .any(|v| v.to_ascii_lowercase().starts_with("ask"));
    labelled_ask
        || el
            .id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case("ask-input"))
}

/// Generic chat interface: a textarea or input that mentions chat.
fn is_chat_interface(el: &ElementSnapshot) -> bool {
    matches!(el.tag.as_str(), "textarea" | "input") && is_text_entry(el) && mentions_chat(el)
}

/// Whether `key` pressed in `el` sends a prompt.
pub fn is_submit_gesture(key: &KeyPress, el: &ElementSnapshot) -> bool {
    if key.key != "Enter" || key.is_composing || key.modifiers.shift {
        return false;
    }
    let m = key.modifiers;
    if m.ctrl || m.meta {
        return is_prompt_input(el);
    }
    if m.is_empty() {
        return is_ask_input(el) || is_chat_interface(el);
    }
    false
}

/// Pushed to subscribers for every detected submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSubmission {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub app_id: String,
    pub hostname: String,
    /// Only present when prompt text capture is enabled.
    pub prompt: Option<String>,
}

struct Shared {
    config: DetectorConfig,
    buffer: DeliveryBuffer,
    word_count: Mutex<usize>,
    word_listeners: Listeners<usize>,
    submit_listeners: Listeners<PromptSubmission>,
    transparency: Option<SharedTransparencyLog>,
}

impl Shared {
    fn count(&self) -> MutexGuard<'_, usize> {
        self.word_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn recount(&self, el: &ElementSnapshot) {
        let words = count_words(&el.text);
        let changed = {
            let mut count = self.count();
            let changed = *count != words;
            *count = words;
            changed
        };
        if changed {
            self.word_listeners.emit(&words);
        }
    }

    fn reset_count(&self) {
        *self.count() = 0;
        self.word_listeners.emit(&0);
    }

    fn submit(&self, session_id: &str, event: &PageEvent) {
        let app_id = app_for_hostname(&event.hostname);
        let prompt = if self.config.capture_prompt_text {
            let text = event.target.text.trim();
            (!text.is_empty()).then(|| text.to_string())
        } else {
            None
        };

        info!(app = app_id, host = %event.hostname, "prompt submitted");

        let submitted = TelemetryEvent::prompt_submit(session_id, app_id, prompt.clone());
        if !self.buffer.add_event(submitted) {
            warn!(app = app_id, "prompt event rejected by delivery buffer");
        }
        if let Some(log) = &self.transparency {
            log.record_prompt_submission();
        }
        self.submit_listeners.emit(&PromptSubmission {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            app_id: app_id.to_string(),
            hostname: event.hostname.clone(),
            prompt,
        });
        self.reset_count();
    }
}

/// Per-run state of the detector task.
#[derive(Default)]
struct Tracking {
    tracked: Option<u64>,
    pending: Option<(Instant, ElementSnapshot)>,
}

impl Tracking {
    fn handle(&mut self, shared: &Shared, session_id: &str, event: PageEvent) {
        match &event.kind {
            PageEventKind::KeyDown { key } => {
                if is_submit_gesture(key, &event.target) {
                    self.pending = None;
                    shared.submit(session_id, &event);
                }
            }
            PageEventKind::Input | PageEventKind::Focus => {
                if is_prompt_input(&event.target) || is_ask_input(&event.target) {
                    self.tracked = Some(event.target.node_id);
                    let deadline = Instant::now() + shared.config.word_count_debounce;
                    self.pending = Some((deadline, event.target));
                }
            }
            PageEventKind::Blur => {
                if self.tracked == Some(event.target.node_id) {
                    self.tracked = None;
                    self.pending = None;
                    shared.reset_count();
                }
            }
        }
    }
}

async fn detect_loop(
    shared: Arc<Shared>,
    session_id: String,
    mut rx: broadcast::Receiver<PageEvent>,
    cancel: CancellationToken,
) {
    let mut tracking = Tracking::default();

    loop {
        let deadline = tracking.pending.as_ref().map(|(at, _)| *at);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((_, el)) = tracking.pending.take() {
                    shared.recount(&el);
                }
            }
            received = rx.recv() => match received {
                Ok(event) => tracking.handle(&shared, &session_id, event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "prompt detector fell behind page input");
                }
                Err(RecvError::Closed) => {
                    debug!("input context closed");
                    break;
                }
            },
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Detects prompt submissions in an [`InputContext`] and feeds them into a
/// delivery buffer.
pub struct PromptDetector {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl PromptDetector {
    pub fn new(config: DetectorConfig, buffer: DeliveryBuffer) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                buffer,
                word_count: Mutex::new(0),
                word_listeners: Listeners::new("word-count"),
                submit_listeners: Listeners::new("prompt-submit"),
                transparency: None,
            }),
            running: Mutex::new(None),
        }
    }

    /// Count detected submissions in `log`. Must be called before `start`.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.transparency = Some(log);
        }
        self
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach to `context`. Returns `false` if already attached.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, session_id: impl Into<String>, context: &InputContext) -> bool {
        let session_id = session_id.into();
        let mut running = self.running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            info!(session = %session_id, "prompt detector already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(detect_loop(
            self.shared.clone(),
            session_id.clone(),
            context.subscribe(),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        info!(session = %session_id, "prompt detector started");
        true
    }

    /// Detach from the input context, dropping any pending recount and the
    /// tracked element.
    pub fn stop(&self) -> bool {
        match self.running().take() {
            Some(running) => {
                running.cancel.cancel();
                running.handle.abort();
                info!("prompt detector stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Words in the tracked prompt input as of the last recount.
    pub fn word_count(&self) -> usize {
        *self.shared.count()
    }

    pub fn subscribe_word_count<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&usize) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.word_listeners.subscribe(callback)
    }

    pub fn subscribe_submissions<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&PromptSubmission) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.submit_listeners.subscribe(callback)
    }

    pub fn unsubscribe_word_count(&self, id: ListenerId) -> bool {
        self.shared.word_listeners.unsubscribe(id)
    }

    pub fn unsubscribe_submissions(&self, id: ListenerId) -> bool {
        self.shared.submit_listeners.unsubscribe(id)
    }

    /// Stop and drop every subscriber.
    pub fn dispose(&self) {
        self.stop();
        self.shared.word_listeners.clear();
        self.shared.submit_listeners.clear();
    }
}

impl Drop for PromptDetector {
    fn drop(&mut self) {
        if let Some(running) = self.running().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}
