//! Generation client: turn a prompt into a reply, whole or as fragments.
//!
//! The conversation only sees the [`Generator`] trait. [`LlmGenerator`] is the
//! production implementation on top of an `edgequake-llm` provider; tests use
//! scripted generators.
//!
//! ## Retry Strategy
//!
//! Opening a request is retried with exponential backoff
//! (`retry_backoff_ms * 2^attempt`), like any transient 429/503. Once the
//! first fragment has been handed to the caller nothing is retried: a broken
//! stream surfaces as [`GenerationError::Stream`] so the user sees what
//! happened instead of a silently truncated reply.

use crate::config::AssistantConfig;
use crate::error::{AssistantError, GenerationError};
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::traits::StreamChunk;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// What a generation request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Summary,
    Quiz,
}

/// A single prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: TaskKind,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn summary(text: &str) -> Self {
        Self {
            kind: TaskKind::Summary,
            prompt: prompts::summary_prompt(text),
        }
    }

    pub fn quiz(text: &str, min_questions: usize) -> Self {
        Self {
            kind: TaskKind::Quiz,
            prompt: prompts::quiz_prompt(text, min_questions),
        }
    }
}

/// A lazy, finite, non-restartable sequence of reply fragments.
///
/// Concatenating the `Ok` items in order yields the full reply. An `Err`
/// item is always the last item.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Produces replies for prompts.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate the complete reply in one piece.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Generate the reply as a stream of fragments.
    ///
    /// An `Err` here means the request could not be opened; failures after
    /// that arrive as the final stream item.
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError>;
}

/// Drain a fragment stream into the full reply text.
pub async fn collect_fragments(mut fragments: FragmentStream) -> Result<String, GenerationError> {
    let mut out = String::new();
    while let Some(fragment) = fragments.next().await {
        out.push_str(&fragment?);
    }
    Ok(out)
}

/// Wrap a raw provider stream with an idle timeout and typed errors.
///
/// Empty fragments are dropped. After an error no further items are
/// produced. A stream that ends without any text yields
/// [`GenerationError::Empty`].
pub fn guard_stream<S, E>(inner: S, idle: Duration) -> FragmentStream
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    struct State<S> {
        inner: Pin<Box<S>>,
        fragments: usize,
        done: bool,
    }

    let state = State {
        inner: Box::pin(inner),
        fragments: 0,
        done: false,
    };

    let s = stream::unfold(state, move |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            match timeout(idle, st.inner.next()).await {
                Ok(Some(Ok(fragment))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    st.fragments += 1;
                    return Some((Ok(fragment), st));
                }
                Ok(Some(Err(e))) => {
                    st.done = true;
                    let err = GenerationError::Stream {
                        fragments: st.fragments,
                        detail: e.to_string(),
                    };
                    return Some((Err(err), st));
                }
                Ok(None) => {
                    st.done = true;
                    if st.fragments == 0 {
                        return Some((Err(GenerationError::Empty), st));
                    }
                    return None;
                }
                Err(_) => {
                    st.done = true;
                    let err = GenerationError::Timeout { after: idle };
                    return Some((Err(err), st));
                }
            }
        }
    });

    Box::pin(s)
}

/// [`Generator`] backed by an `edgequake-llm` provider.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl LlmGenerator {
    /// Wrap an existing provider using the generation settings from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AssistantConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: config.api_timeout(),
        }
    }

    /// Resolve the provider from `config` or the environment.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let provider = resolve_provider(config)?;
        info!(
            "Using LLM provider '{}' (model '{}')",
            provider.name(),
            provider.model()
        );
        Ok(Self::new(provider, config))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// Run `attempt` with per-attempt timeout and exponential backoff between attempts.
    async fn with_retries<T, F, Fut>(&self, kind: TaskKind, mut attempt: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut last_err: Option<String> = None;

        for n in 0..=self.max_retries {
            if n > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(n - 1);
                warn!(
                    "{:?}: retry {}/{} after {}ms",
                    kind, n, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.api_timeout, attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!("{:?}: attempt {} failed: {}", kind, n + 1, e);
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(
                        "{:?}: attempt {} timed out after {:?}",
                        kind,
                        n + 1,
                        self.api_timeout
                    );
                    last_err = Some(format!("timed out after {:?}", self.api_timeout));
                }
            }
        }

        Err(GenerationError::Request {
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(request.prompt.as_str())];
        let options = self.options();
        let (provider, messages, options) = (&self.provider, &messages, &options);

        let response = self
            .with_retries(request.kind, || async move {
                provider
                    .chat(messages, Some(options))
                    .await
                    .map_err(|e| e.to_string())
            })
            .await?;

        debug!(
            "{:?}: {} input tokens, {} output tokens, {:?}",
            request.kind,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(response.content)
    }

    /// Streams through `chat_with_tools_stream` (with no tools) so the same
    /// temperature and token limit reach the model as on the whole-reply path.
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError> {
        if !self.provider.supports_tool_streaming() {
            debug!(
                "Provider '{}' cannot stream with options; sending the reply as one fragment",
                self.provider.name()
            );
            let text = self.generate(request).await?;
            return Ok(Box::pin(stream::once(async move { Ok(text) })));
        }

        let messages = vec![ChatMessage::user(request.prompt.as_str())];
        let options = self.options();
        let (provider, messages, options) = (&self.provider, &messages, &options);

        let chunks = self
            .with_retries(request.kind, || async move {
                provider
                    .chat_with_tools_stream(messages, &[], None, Some(options))
                    .await
                    .map_err(|e| e.to_string())
            })
            .await?;

        let text = chunks.filter_map(|chunk| {
            future::ready(match chunk {
                Ok(StreamChunk::Content(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });

        Ok(guard_stream(text, self.api_timeout))
    }
}

/// Resolve LLM provider from config.
fn resolve_provider(config: &AssistantConfig) -> Result<Arc<dyn LLMProvider>, AssistantError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    // Honour EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL when both set
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    // Prefer OpenAI when its key is present, so users holding several
    // provider keys get a predictable default.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| AssistantError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!("No LLM provider auto-detected: {}", e),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AssistantError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AssistantError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::providers::MockAgentProvider;
    use edgequake_llm::{LLMResponse, LlmError, MockProvider};
    use futures::stream::BoxStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` calls, optionally hangs, and records the
    /// options it was called with.
    struct FlakyProvider {
        failures: usize,
        hang: bool,
        reply: Vec<&'static str>,
        attempts: AtomicUsize,
        seen: Mutex<Vec<CompletionOptions>>,
    }

    impl FlakyProvider {
        fn new(failures: usize, reply: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                failures,
                hang: false,
                reply,
                attempts: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                failures: 0,
                hang: true,
                reply: vec!["late"],
                attempts: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        async fn attempt(&self, options: Option<&CompletionOptions>) -> edgequake_llm::Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(o) = options {
                self.seen.lock().unwrap().push(o.clone());
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            if n < self.failures {
                return Err(LlmError::NetworkError("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "flaky-model"
        }

        fn max_context_length(&self) -> usize {
            8192
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[], None).await
        }

        async fn complete_with_options(
            &self,
            _prompt: &str,
            options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[], Some(options)).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.attempt(options).await?;
            Ok(LLMResponse::new(self.reply.concat(), "flaky-model"))
        }

        async fn chat_with_tools_stream(
            &self,
            _messages: &[ChatMessage],
            _tools: &[edgequake_llm::ToolDefinition],
            _tool_choice: Option<edgequake_llm::ToolChoice>,
            options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<BoxStream<'static, edgequake_llm::Result<StreamChunk>>> {
            self.attempt(options).await?;
            let mut chunks = vec![Ok(StreamChunk::ThinkingContent {
                text: "hmm".into(),
                tokens_used: None,
                budget_total: None,
            })];
            chunks.extend(
                self.reply
                    .iter()
                    .map(|t| Ok(StreamChunk::Content(t.to_string()))),
            );
            chunks.push(Ok(StreamChunk::Finished {
                reason: "stop".into(),
                ttft_ms: None,
            }));
            Ok(stream::iter(chunks).boxed())
        }

        fn supports_streaming(&self) -> bool {
            true
        }

        fn supports_tool_streaming(&self) -> bool {
            true
        }
    }

    fn generator(provider: Arc<dyn LLMProvider>, max_retries: u32) -> LlmGenerator {
        LlmGenerator {
            provider,
            temperature: 0.3,
            max_tokens: 1024,
            max_retries,
            retry_backoff_ms: 1,
            api_timeout: Duration::from_millis(50),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::summary("cells divide")
    }

    #[tokio::test]
    async fn whole_reply_from_provider() {
        let mock = MockProvider::new();
        mock.add_response("A summary.").await;
        let g = generator(Arc::new(mock), 0);
        assert_eq!(g.generate(&request()).await.unwrap(), "A summary.");
        assert_eq!(g.provider_name(), "mock");
        assert_eq!(g.model(), "mock-model");
    }

    #[tokio::test]
    async fn empty_whole_reply_is_an_error() {
        let mock = MockProvider::new();
        mock.add_response("").await;
        let g = generator(Arc::new(mock), 0);
        assert_eq!(g.generate(&request()).await, Err(GenerationError::Empty));
    }

    #[tokio::test]
    async fn provider_without_option_streaming_falls_back_to_one_fragment() {
        let mock = MockProvider::new();
        mock.add_response("Whole reply in one piece.").await;
        let g = generator(Arc::new(mock), 0);

        let items: Vec<_> = g.stream(&request()).await.unwrap().collect().await;
        assert_eq!(items, vec![Ok("Whole reply in one piece.".to_string())]);
    }

    #[tokio::test]
    async fn streaming_provider_yields_content() {
        let mock = MockAgentProvider::new();
        mock.add_response("Streamed summary.").await;
        let g = generator(Arc::new(mock), 0);

        let text = collect_fragments(g.stream(&request()).await.unwrap()).await;
        assert_eq!(text.unwrap(), "Streamed summary.");
    }

    #[tokio::test]
    async fn stream_keeps_only_content_chunks() {
        let provider = FlakyProvider::new(0, vec!["The ", "quick ", "fox"]);
        let g = generator(provider.clone(), 0);

        let items: Vec<_> = g.stream(&request()).await.unwrap().collect().await;
        assert_eq!(
            items,
            vec![
                Ok("The ".to_string()),
                Ok("quick ".to_string()),
                Ok("fox".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn stream_and_whole_reply_send_the_same_options() {
        let provider = FlakyProvider::new(0, vec!["a", "b"]);
        let g = generator(provider.clone(), 0);

        let streamed = collect_fragments(g.stream(&request()).await.unwrap()).await;
        let whole = g.generate(&request()).await;
        assert_eq!(streamed, whole);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for options in seen.iter() {
            assert_eq!(options.temperature, Some(0.3));
            assert_eq!(options.max_tokens, Some(1024));
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let provider = FlakyProvider::new(2, vec!["ok"]);
        let g = generator(provider.clone(), 3);

        assert_eq!(g.generate(&request()).await.unwrap(), "ok");
        assert_eq!(provider.attempts(), 3);
    }

    #[tokio::test]
    async fn opening_a_stream_is_retried() {
        let provider = FlakyProvider::new(1, vec!["ok"]);
        let g = generator(provider.clone(), 1);

        let text = collect_fragments(g.stream(&request()).await.unwrap()).await;
        assert_eq!(text.unwrap(), "ok");
        assert_eq!(provider.attempts(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let provider = FlakyProvider::new(usize::MAX, vec!["never"]);
        let g = generator(provider.clone(), 2);

        let err = g.generate(&request()).await.unwrap_err();
        match err {
            GenerationError::Request { retries, detail } => {
                assert_eq!(retries, 2);
                assert!(detail.contains("connection refused"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.attempts(), 3);
    }

    #[tokio::test]
    async fn each_attempt_is_bounded_by_the_api_timeout() {
        let provider = FlakyProvider::hanging();
        let g = generator(provider.clone(), 1);

        let err = g.stream(&request()).await.err().unwrap();
        assert!(
            matches!(&err, GenerationError::Request { detail, .. } if detail.contains("timed out")),
            "got: {err:?}"
        );
        assert_eq!(provider.attempts(), 2);
    }

    fn fragments(items: Vec<Result<&'static str, &'static str>>) -> FragmentStream {
        let items: Vec<Result<String, String>> = items
            .into_iter()
            .map(|r| r.map(String::from).map_err(String::from))
            .collect();
        guard_stream(stream::iter(items), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn collect_concatenates_in_order() {
        let s = fragments(vec![Ok("The "), Ok("quick "), Ok("fox")]);
        assert_eq!(collect_fragments(s).await.unwrap(), "The quick fox");
    }

    #[tokio::test]
    async fn empty_fragments_are_dropped() {
        let s = fragments(vec![Ok(""), Ok("a"), Ok(""), Ok("b")]);
        let items: Vec<_> = s.collect().await;
        assert_eq!(items, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn mid_stream_error_is_last_item() {
        let s = fragments(vec![Ok("a"), Ok("b"), Err("connection reset"), Ok("never")]);
        let items: Vec<_> = s.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[2],
            Err(GenerationError::Stream {
                fragments: 2,
                detail: "connection reset".into()
            })
        );
    }

    #[tokio::test]
    async fn stream_without_text_is_empty_error() {
        let s = fragments(vec![Ok("")]);
        assert_eq!(collect_fragments(s).await, Err(GenerationError::Empty));
    }

    #[tokio::test]
    async fn idle_stream_times_out() {
        let stalled = stream::pending::<Result<String, String>>();
        let s = guard_stream(stalled, Duration::from_millis(10));
        let items: Vec<_> = s.collect().await;
        assert_eq!(items, vec![Err(GenerationError::Timeout {
                after: Duration::from_millis(10)
            })]);
    }

    #[test]
    fn quiz_request_uses_minimum() {
        let r = GenerationRequest::quiz("cells", 7);
        assert_eq!(r.kind, TaskKind::Quiz);
        assert!(r.prompt.contains("at least 7 questions"));
    }

    #[test]
    fn summary_request_kind() {
        let r = GenerationRequest::summary("cells");
        assert_eq!(r.kind, TaskKind::Summary);
        assert!(r.prompt.contains("cells"));
    }
}
