//! Error types for the edgequake-pdfquiz library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AssistantError`] is **fatal**: the assistant cannot be set up at all
//!   (invalid configuration, no LLM provider, pdfium missing). Returned from
//!   builders and constructors before any conversation starts.
//!
//! * [`TurnError`] is **recoverable**: a single interaction failed (rejected
//!   upload, unreadable PDF, quiz without a document, generation failure).
//!   The controller reports it to the user and keeps the session alive.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfquiz library.
///
/// Per-interaction failures use [`TurnError`] and are reported in the chat
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum AssistantError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory), or install\n\
libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why an upload was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Declared MIME type is not one of the accepted types.
    WrongType { mime: String },
    /// File is larger than the configured maximum.
    TooLarge { size: u64, max: u64 },
    /// Zero-byte file.
    Empty,
    /// Declared as a PDF but the content does not start with `%PDF`.
    NotAPdf { magic: [u8; 4] },
    /// No file arrived before the upload timeout.
    Timeout { secs: u64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::WrongType { mime } => {
                write!(f, "'{mime}' is not a PDF")
            }
            RejectReason::TooLarge { size, max } => write!(
                f,
                "file is {:.1} MB, the limit is {:.1} MB",
                *size as f64 / (1024.0 * 1024.0),
                *max as f64 / (1024.0 * 1024.0)
            ),
            RejectReason::Empty => write!(f, "file is empty"),
            RejectReason::NotAPdf { magic } => {
                write!(f, "file content is not a PDF (first bytes: {magic:?})")
            }
            RejectReason::Timeout { secs } => {
                write!(f, "no file received within {secs}s")
            }
        }
    }
}

/// A failed call to the generation client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The request could not be sent or the provider rejected it.
    #[error("generation request failed after {retries} retries: {detail}")]
    Request { retries: u32, detail: String },

    /// The fragment stream broke after it had started.
    #[error("generation stream interrupted after {fragments} fragments: {detail}")]
    Stream { fragments: usize, detail: String },

    /// No response (or next fragment) within the API timeout.
    #[error("generation timed out after {after:?}")]
    Timeout { after: Duration },

    /// The provider finished without producing any text.
    #[error("the model returned an empty response")]
    Empty,
}

/// A recoverable error for a single interaction.
///
/// The controller turns each variant into a chat message and waits for the
/// next user input; none of them end the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnError {
    /// Wrong type, oversize, empty or timed-out upload.
    #[error("Upload rejected: {0}")]
    UploadRejected(RejectReason),

    /// The document could not be opened or read.
    #[error("Could not read '{name}': {detail}")]
    Extraction { name: String, detail: String },

    /// A quiz was requested before any document was uploaded.
    #[error("No document has been uploaded in this session")]
    MissingContext,

    /// The generation client failed or was interrupted.
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}
