//! Workflow monitoring: which application has focus, and when a prompt is
//! sent to an AI tool.

mod focus;
mod input;
mod prompt;

pub use focus::{FocusChange, FocusMonitor};
pub use input::{ElementSnapshot, InputContext, KeyPress, Modifiers, PageEvent, PageEventKind};
pub use prompt::{
    app_for_hostname, count_words, is_ask_input, is_prompt_input, is_submit_gesture,
    PromptDetector, PromptSubmission,
};
