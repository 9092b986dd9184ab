//! Per-conversation state, keyed by session identity.
//!
//! The store is shared by `Arc` between conversations, but each
//! conversation only ever reads and writes its own entry. A session is
//! created when a conversation starts and removed when it ends; removing it
//! drops the staged upload, which deletes the temporary file.

use crate::document::ExtractedText;
use crate::pipeline::upload::StagedDocument;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Identity of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// What a session remembers between interactions.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Text of the most recent successful upload.
    pub text: Option<Arc<ExtractedText>>,
    /// The staged file the text came from.
    pub document: Option<StagedDocument>,
}

/// Process-wide map from session id to session state.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, empty session.
    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.write().await.insert(id, SessionState::default());
        debug!("Session {} created", id);
        id
    }

    /// Replace the session's document and text.
    ///
    /// The previous staged file, if any, is dropped here.
    pub async fn store(
        &self,
        id: SessionId,
        document: StagedDocument,
        text: ExtractedText,
    ) -> Arc<ExtractedText> {
        let text = Arc::new(text);
        let mut sessions = self.sessions.write().await;
        let state = sessions.entry(id).or_default();
        state.document = Some(document);
        state.text = Some(Arc::clone(&text));
        text
    }

    /// Text of the session's current document, if one was uploaded.
    pub async fn text(&self, id: SessionId) -> Option<Arc<ExtractedText>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .and_then(|s| s.text.clone())
    }

    /// Forget the session and delete its staged file.
    pub async fn clear(&self, id: SessionId) {
        if self.sessions.write().await.remove(&id).is_some() {
            debug!("Session {} cleared", id);
        }
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
