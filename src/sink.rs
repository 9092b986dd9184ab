//! Display-side trait for everything the assistant says.
//!
//! The controller never renders anything itself. It hands complete replies
//! and streamed fragments to an [`Arc<dyn ChatSink>`]; the host decides
//! whether they end up in a terminal, a WebSocket or a test recorder.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfquiz::{ChatSink, Reply};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<String>);
//!
//! impl ChatSink for Collect {
//!     fn on_fragment(&self, fragment: &str) {
//!         self.0.lock().unwrap().push_str(fragment);
//!     }
//! }
//!
//! let sink: Arc<dyn ChatSink> = Arc::new(Collect::default());
//! sink.on_fragment("Hello");
//! ```

use crate::prompts::{ASSISTANT_NAME, CREATE_QUIZ_LABEL};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A clickable action attached to a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    /// Same as typing "create quiz".
    CreateQuiz,
}

impl ChatAction {
    pub fn label(&self) -> &'static str {
        match self {
            ChatAction::CreateQuiz => CREATE_QUIZ_LABEL,
        }
    }
}

/// One message from the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// Set on generated replies, `None` on system notices.
    pub author: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ChatAction>,
}

impl Reply {
    /// A plain notice.
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            author: None,
            content: content.into(),
            actions: Vec::new(),
        }
    }

    /// A message attributed to the assistant.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            author: Some(ASSISTANT_NAME.to_string()),
            content: content.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ChatAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Receives the assistant's output.
///
/// All methods default to no-ops so implementors only override what they
/// render. For a streamed reply the calls are always
/// `on_stream_start`, then zero or more `on_fragment` in arrival order, then
/// `on_stream_end` with the complete text.
pub trait ChatSink: Send + Sync {
    /// A complete message.
    fn on_message(&self, reply: &Reply) {
        let _ = reply;
    }

    /// A message that will grow as fragments arrive; `reply.content` is its header.
    fn on_stream_start(&self, reply: &Reply) {
        let _ = reply;
    }

    /// The next fragment of the open streamed message.
    fn on_fragment(&self, fragment: &str) {
        let _ = fragment;
    }

    /// The streamed message is finished; `reply.content` is header plus every fragment.
    fn on_stream_end(&self, reply: &Reply) {
        let _ = reply;
    }
}

/// A sink that discards everything.
pub struct NoopSink;

impl ChatSink for NoopSink {}

/// Shared sink handle.
pub type SharedSink = Arc<dyn ChatSink>;
