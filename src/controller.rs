//! The conversation state machine.
//!
//! ```text
//! AwaitingUpload ──upload──▶ Extracting ──text──▶ SummaryReady ──offer──▶ QuizOffered ──quiz──▶ QuizReady
//!       ▲                        │
//!       └──── rejected / unreadable / timed out
//! ```
//!
//! Every user interaction enters through [`Conversation::dispatch`], which
//! runs the interaction to completion (including streaming the reply to the
//! sink) and returns the new state. Nothing a user does, and nothing the
//! extractor or model does, ends the session: failures become chat messages.

use crate::config::AssistantConfig;
use crate::document::Document;
use crate::error::{GenerationError, TurnError};
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::generate::{GenerationRequest, Generator, TaskKind};
use crate::pipeline::upload::{StagedDocument, UploadPolicy};
use crate::prompts;
use crate::session::{SessionId, SessionStore};
use crate::sink::{ChatAction, Reply, SharedSink};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Waiting for the user to upload a PDF.
    AwaitingUpload,
    /// A document is being read.
    Extracting,
    /// The summary has been streamed.
    SummaryReady,
    /// The quiz action has been offered.
    QuizOffered,
    /// A quiz has been streamed.
    QuizReady,
}

/// One user interaction.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The user submitted a file.
    Upload(Document),
    /// No file arrived within the upload timeout.
    UploadTimedOut,
    /// Free text typed by the user.
    Message(String),
    /// The user clicked an action button.
    Action(ChatAction),
}

/// Meaning of a free-text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CreateQuiz,
    Unrecognised,
}

/// Interpret a typed message.
///
/// Only the exact phrase "create quiz" counts, ignoring ASCII case and
/// surrounding whitespace.
pub fn parse_command(text: &str) -> Command {
    if text.trim().eq_ignore_ascii_case("create quiz") {
        Command::CreateQuiz
    } else {
        Command::Unrecognised
    }
}

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

/// Everything said in one session, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub session: Option<SessionId>,
    pub entries: Vec<TranscriptEntry>,
}

impl Transcript {
    fn push(&mut self, role: Role, content: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            role,
            content: content.into(),
        });
    }
}

/// One user's conversation with the assistant.
pub struct Conversation {
    id: SessionId,
    state: ConversationState,
    policy: UploadPolicy,
    min_quiz_questions: usize,
    preview_chars: usize,
    stream: bool,
    store: Arc<SessionStore>,
    extractor: Arc<dyn TextExtractor>,
    generator: Arc<dyn Generator>,
    sink: SharedSink,
    transcript: Transcript,
}

impl Conversation {
    /// Open a session, greet the user and ask for a PDF.
    pub async fn start(
        config: &AssistantConfig,
        store: Arc<SessionStore>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn Generator>,
        sink: SharedSink,
    ) -> Self {
        let id = store.create().await;
        info!("Session {} started", id);

        let mut conversation = Self {
            id,
            state: ConversationState::AwaitingUpload,
            policy: UploadPolicy::from_config(config),
            min_quiz_questions: config.min_quiz_questions,
            preview_chars: config.preview_chars,
            stream: config.stream,
            store,
            extractor,
            generator,
            sink,
            transcript: Transcript {
                session: Some(id),
                entries: Vec::new(),
            },
        };

        conversation.post(Reply::notice(prompts::WELCOME));
        conversation.post(Reply::notice(prompts::UPLOAD_PROMPT));
        conversation
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// How long the host should wait for a file, when a file is expected.
    pub fn upload_deadline(&self) -> Option<Duration> {
        match self.state {
            ConversationState::AwaitingUpload => Some(self.policy.timeout),
            _ => None,
        }
    }

    /// Advance the state machine by one user interaction.
    pub async fn dispatch(&mut self, event: ChatEvent) -> ConversationState {
        match event {
            ChatEvent::Upload(doc) => {
                self.transcript.push(Role::User, format!("📎 {}", doc.name));
                self.handle_upload(doc).await;
            }
            ChatEvent::UploadTimedOut => {
                if self.state == ConversationState::AwaitingUpload {
                    debug!("Session {}: upload wait timed out, asking again", self.id);
                    self.post(Reply::notice(prompts::UPLOAD_PROMPT));
                }
            }
            ChatEvent::Message(text) => {
                self.transcript.push(Role::User, text.as_str());
                match parse_command(&text) {
                    Command::CreateQuiz => self.handle_quiz().await,
                    Command::Unrecognised => self.post(Reply::notice(prompts::GUIDANCE)),
                }
            }
            ChatEvent::Action(action) => {
                self.transcript.push(Role::User, format!("[{}]", action.label()));
                match action {
                    ChatAction::CreateQuiz => self.handle_quiz().await,
                }
            }
        }
        self.state
    }

    /// Close the session, deleting its staged document.
    pub async fn end(self) -> Transcript {
        self.store.clear(self.id).await;
        info!("Session {} ended", self.id);
        self.transcript
    }

    // ── Upload → extract → summary ───────────────────────────────────────

    async fn handle_upload(&mut self, doc: Document) {
        if let Err(e) = self.policy.validate(&doc) {
            self.reject_upload(e);
            return;
        }

        info!("Session {}: received '{}' ({} bytes)", self.id, doc.name, doc.size());
        self.state = ConversationState::Extracting;
        self.post(Reply::notice(prompts::processing_notice(&doc.name)));

        let staged = match StagedDocument::stage(&doc) {
            Ok(s) => s,
            Err(e) => {
                self.reject_upload(TurnError::Extraction {
                    name: doc.name.clone(),
                    detail: e.to_string(),
                });
                return;
            }
        };

        let start = Instant::now();
        let extracted = match self.extractor.extract(staged.path(), staged.name()).await {
            Ok(text) if text.is_empty() => {
                self.reject_upload(TurnError::Extraction {
                    name: doc.name.clone(),
                    detail: "no page has an extractable text layer".into(),
                });
                return;
            }
            Ok(text) => text,
            Err(e) => {
                self.reject_upload(e);
                return;
            }
        };
        info!(
            "Session {}: extracted {} chars from {}/{} pages in {:?}",
            self.id,
            extracted.as_str().len(),
            extracted.pages_with_text(),
            extracted.page_count(),
            start.elapsed()
        );

        let text = self.store.store(self.id, staged, extracted).await;

        if self.preview_chars > 0 {
            self.post(Reply::notice(prompts::preview_message(
                text.pages_with_text(),
                text.page_count(),
                &text.preview(self.preview_chars),
            )));
        }

        let request = GenerationRequest::summary(text.as_str());
        if self.run_generation(&request, prompts::SUMMARY_HEADER).await.is_ok() {
            self.state = ConversationState::SummaryReady;
        }

        self.post(Reply::notice(prompts::QUIZ_OFFER).with_action(ChatAction::CreateQuiz));
        self.state = ConversationState::QuizOffered;
    }

    /// Report a rejected or unreadable upload and ask for another file.
    ///
    /// Hosts call this for failures that happen before a [`Document`]
    /// exists, such as a file that could not be read from disk.
    pub fn reject_upload(&mut self, err: TurnError) {
        warn!("Session {}: {}", self.id, err);
        self.post(Reply::notice(format!("⚠️ {err}")));
        self.post(Reply::notice(prompts::UPLOAD_PROMPT));
        self.state = ConversationState::AwaitingUpload;
    }

    // ── Quiz ─────────────────────────────────────────────────────────────

    async fn handle_quiz(&mut self) {
        let Some(text) = self.store.text(self.id).await else {
            debug!("Session {}: {}", self.id, TurnError::MissingContext);
            self.post(Reply::notice(prompts::MISSING_DOCUMENT));
            self.state = ConversationState::AwaitingUpload;
            return;
        };

        self.post(Reply::assistant(prompts::QUIZ_PENDING));

        let request = GenerationRequest::quiz(text.as_str(), self.min_quiz_questions);
        match self.run_generation(&request, prompts::QUIZ_HEADER).await {
            Ok(()) => {
                self.post(Reply::notice(prompts::QUIZ_DONE));
                self.state = ConversationState::QuizReady;
            }
            Err(_) => {
                self.state = ConversationState::QuizOffered;
            }
        }
    }

    // ── Generation ───────────────────────────────────────────────────────

    /// Stream one reply into a growing message that starts with `header`.
    ///
    /// On failure the message is closed with whatever arrived and a separate
    /// error message is posted.
    async fn run_generation(
        &mut self,
        request: &GenerationRequest,
        header: &str,
    ) -> Result<(), GenerationError> {
        let start = Instant::now();
        info!("Session {}: generating {:?}", self.id, request.kind);

        self.sink.on_stream_start(&Reply::assistant(header));
        let mut content = header.to_string();
        let mut fragments = 0usize;

        let result = if self.stream {
            match self.generator.stream(request).await {
                Ok(mut stream) => {
                    let mut outcome = Ok(());
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(fragment) => {
                                self.sink.on_fragment(&fragment);
                                content.push_str(&fragment);
                                fragments += 1;
                            }
                            Err(e) => {
                                outcome = Err(e);
                                break;
                            }
                        }
                    }
                    outcome
                }
                Err(e) => Err(e),
            }
        } else {
            self.generator.generate(request).await.map(|text| {
                self.sink.on_fragment(&text);
                content.push_str(&text);
                fragments = 1;
            })
        };

        let finished = Reply::assistant(content);
        self.sink.on_stream_end(&finished);
        self.transcript.push(Role::Assistant, finished.content);

        match result {
            Ok(()) => {
                debug!(
                    "Session {}: {:?} done, {} fragments in {:?}",
                    self.id,
                    request.kind,
                    fragments,
                    start.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Session {}: {:?} failed: {}", self.id, request.kind, e);
                let mut notice = Reply::notice(prompts::generation_failed(&e.to_string()));
                if request.kind == TaskKind::Quiz {
                    notice = notice.with_action(ChatAction::CreateQuiz);
                }
                self.post(notice);
                Err(e)
            }
        }
    }

    fn post(&mut self, reply: Reply) {
        self.sink.on_message(&reply);
        self.transcript.push(Role::Assistant, reply.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_command_variants() {
        assert_eq!(parse_command("Create Quiz"), Command::CreateQuiz);
        assert_eq!(parse_command("create quiz"), Command::CreateQuiz);
        assert_eq!(parse_command("  create quiz  "), Command::CreateQuiz);
        assert_eq!(parse_command("CREATE QUIZ\n"), Command::CreateQuiz);
    }

    #[test]
    fn near_misses_are_not_commands() {
        assert_eq!(parse_command("Create a Quiz"), Command::Unrecognised);
        assert_eq!(parse_command("create  quiz"), Command::Unrecognised);
        assert_eq!(parse_command("quiz"), Command::Unrecognised);
        assert_eq!(parse_command(""), Command::Unrecognised);
    }

    #[test]
    fn transcript_serialises_roles() {
        let mut t = Transcript::default();
        t.push(Role::User, "hi");
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }
}
