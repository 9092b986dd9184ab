//! # edgequake-pdfquiz
//!
//! Upload a PDF, get a streamed summary, then turn it into a multiple-choice
//! quiz, all through one small chat state machine.
//!
//! ## Flow
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload    validate type / size / magic bytes, stage to a temp file
//!  ├─ 2. Extract   page texts via pdfium (spawn_blocking), empty pages skipped
//!  ├─ 3. Summary   streamed from the LLM into one growing message
//!  ├─ 4. Offer     "Create Quiz" action, or type "create quiz"
//!  └─ 5. Quiz      ≥ 5 questions, options A–D, correct answer marked
//! ```
//!
//! The PDF library, the model and the display are injected as trait objects
//! ([`TextExtractor`], [`Generator`], [`ChatSink`]), so the whole
//! conversation can be exercised without pdfium or network access.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfquiz::{
//!     AssistantConfig, ChatEvent, Conversation, LlmGenerator, NoopSink,
//!     PdfiumExtractor, SessionStore, load_document,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AssistantConfig::default();
//!     let mut chat = Conversation::start(
//!         &config,
//!         Arc::new(SessionStore::new()),
//!         Arc::new(PdfiumExtractor::new()?),
//!         Arc::new(LlmGenerator::from_config(&config)?),
//!         Arc::new(NoopSink),
//!     )
//!     .await;
//!
//!     let doc = load_document(Path::new("lecture.pdf"), chat.policy()).await?;
//!     chat.dispatch(ChatEvent::Upload(doc)).await;
//!     chat.dispatch(ChatEvent::Message("create quiz".into())).await;
//!     let transcript = chat.end().await;
//!     println!("{}", serde_json::to_string_pretty(&transcript)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfquiz` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AssistantConfig, AssistantConfigBuilder};
pub use controller::{
    parse_command, ChatEvent, Command, Conversation, ConversationState, Role, Transcript,
    TranscriptEntry,
};
pub use document::{Document, ExtractedText};
pub use error::{AssistantError, GenerationError, RejectReason, TurnError};
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use pipeline::generate::{
    collect_fragments, FragmentStream, GenerationRequest, Generator, LlmGenerator, TaskKind,
};
pub use pipeline::upload::{load_document, within_deadline, StagedDocument, UploadPolicy};
pub use session::{SessionId, SessionStore};
pub use sink::{ChatAction, ChatSink, NoopSink, Reply, SharedSink};
