//! Configuration types for the PDF summary & quiz assistant.
//!
//! All assistant behaviour is controlled through [`AssistantConfig`], built
//! via its [`AssistantConfigBuilder`]. Upload limits, generation settings and
//! quiz shape live in one struct so a conversation, its upload handler and its
//! generation client all read the same values.

use crate::error::AssistantError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// MIME type accepted by default.
pub const PDF_MIME: &str = "application/pdf";

/// Configuration for a PDF summary & quiz session.
///
/// Built via [`AssistantConfig::builder()`] or using
/// [`AssistantConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfquiz::AssistantConfig;
///
/// let config = AssistantConfig::builder()
///     .max_upload_mb(10)
///     .upload_timeout_secs(60)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct AssistantConfig {
    /// Largest accepted upload in bytes. Default: 20 MiB.
    pub max_upload_bytes: u64,

    /// How long to wait for a file before re-prompting. Default: 180.
    pub upload_timeout_secs: u64,

    /// Declared MIME types accepted by the upload handler. Default: `application/pdf`.
    pub accepted_mime_types: Vec<String>,

    /// LLM model identifier, e.g. "gpt-4.1-mini", "gemini-2.0-flash".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the model may generate per reply. Default: 4096.
    ///
    /// A five-question quiz with four options each and marked answers fits
    /// comfortably; long summaries of large documents may need more.
    pub max_tokens: usize,

    /// Maximum retry attempts when a generation request cannot be opened. Default: 3.
    ///
    /// Only the request is retried. Once fragments have reached the user a
    /// broken stream is reported, never replayed.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Idle timeout in seconds for opening a generation and for each next fragment. Default: 120.
    pub api_timeout_secs: u64,

    /// Minimum number of questions the quiz prompt asks for. Default: 5.
    pub min_quiz_questions: usize,

    /// Characters of extracted text echoed back after an upload. Default: 0 (off).
    pub preview_chars: usize,

    /// Stream fragments as they arrive (true) or request one complete reply. Default: true.
    pub stream: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024,
            upload_timeout_secs: 180,
            accepted_mime_types: vec![PDF_MIME.to_string()],
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            min_quiz_questions: 5,
            preview_chars: 0,
            stream: true,
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("accepted_mime_types", &self.accepted_mime_types)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("min_quiz_questions", &self.min_quiz_questions)
            .field("preview_chars", &self.preview_chars)
            .field("stream", &self.stream)
            .finish()
    }
}

impl AssistantConfig {
    /// Create a new builder for `AssistantConfig`.
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`AssistantConfig`].
#[derive(Debug)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn max_upload_mb(mut self, mb: u64) -> Self {
        self.config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn accept_mime_type(mut self, mime: impl Into<String>) -> Self {
        let mime = mime.into();
        if !self.config.accepted_mime_types.contains(&mime) {
            self.config.accepted_mime_types.push(mime);
        }
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn min_quiz_questions(mut self, n: usize) -> Self {
        self.config.min_quiz_questions = n;
        self
    }

    pub fn preview_chars(mut self, n: usize) -> Self {
        self.config.preview_chars = n;
        self
    }

    pub fn stream(mut self, v: bool) -> Self {
        self.config.stream = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssistantConfig, AssistantError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(AssistantError::InvalidConfig(
                "Maximum upload size must be > 0".into(),
            ));
        }
        if c.upload_timeout_secs == 0 {
            return Err(AssistantError::InvalidConfig(
                "Upload timeout must be ≥ 1s".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AssistantError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        if c.accepted_mime_types.is_empty() {
            return Err(AssistantError::InvalidConfig(
                "At least one accepted MIME type is required".into(),
            ));
        }
        if c.min_quiz_questions == 0 {
            return Err(AssistantError::InvalidConfig(
                "A quiz needs at least one question".into(),
            ));
        }
        Ok(self.config)
    }
}
