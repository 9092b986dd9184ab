//! CLI binary for edgequake-pdfquiz.
//!
//! A terminal chat over the library's `Conversation`: lines typed by the user
//! become chat events, replies and streamed fragments are printed as they
//! arrive.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfquiz::{
    load_document, within_deadline, AssistantConfig, ChatAction, ChatEvent, ChatSink,
    Conversation, LlmGenerator, PdfiumExtractor, Reply, SessionStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Terminal sink ────────────────────────────────────────────────────────────

/// Prints replies to stdout; shows a spinner until the first fragment of a
/// streamed reply arrives.
struct TerminalSink {
    spinner: Mutex<Option<ProgressBar>>,
    show_spinner: bool,
}

impl TerminalSink {
    fn new(show_spinner: bool) -> Arc<Self> {
        Arc::new(Self {
            spinner: Mutex::new(None),
            show_spinner,
        })
    }

    fn start_spinner(&self) {
        if !self.show_spinner {
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_message("thinking…");
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(bar);
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

fn render_author(reply: &Reply) -> String {
    match reply.author {
        Some(ref a) => format!("{} ", bold(&cyan(&format!("{a}:")))),
        None => String::new(),
    }
}

impl ChatSink for TerminalSink {
    fn on_message(&self, reply: &Reply) {
        self.stop_spinner();
        let content = if reply.content.starts_with('⚠') {
            red(&reply.content)
        } else {
            reply.content.clone()
        };
        println!("{}{}", render_author(reply), content);
        for action in &reply.actions {
            println!(
                "  {}  {}",
                bold(&format!("[{}]", action.label())),
                dim("(type /quiz)")
            );
        }
        println!();
    }

    fn on_stream_start(&self, reply: &Reply) {
        print!("{}{}", render_author(reply), reply.content);
        io::stdout().flush().ok();
        self.start_spinner();
    }

    fn on_fragment(&self, fragment: &str) {
        self.stop_spinner();
        print!("{fragment}");
        io::stdout().flush().ok();
    }

    fn on_stream_end(&self, _reply: &Reply) {
        self.stop_spinner();
        println!("\n");
    }
}

// ── CLI ──────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"COMMANDS (inside the chat):
  /upload <path>   Upload a PDF (pasting the path of an existing .pdf works too)
  /quiz            Click the "Create Quiz" button
  create quiz      Same as /quiz
  /quit            Leave the chat

EXAMPLES:
  # Start a chat and upload from inside it
  pdfquiz

  # Upload immediately, ask for 8 questions
  pdfquiz --questions 8 lecture.pdf

  # Save the whole conversation as JSON on exit
  pdfquiz --transcript session.json notes.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Chat with your PDFs: a streamed summary, then a multiple-choice quiz.
#[derive(Parser, Debug)]
#[command(
    name = "pdfquiz",
    version,
    about = "Summarize a PDF and generate a multiple-choice quiz from it",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF to upload as soon as the chat starts.
    input: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Largest accepted upload in MB.
    #[arg(long, env = "PDFQUIZ_MAX_UPLOAD_MB", default_value_t = 20)]
    max_upload_mb: u64,

    /// Seconds to wait for an upload before asking again.
    #[arg(long, env = "PDFQUIZ_UPLOAD_TIMEOUT", default_value_t = 180)]
    upload_timeout: u64,

    /// Minimum number of quiz questions.
    #[arg(long, env = "PDFQUIZ_QUESTIONS", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..=50))]
    questions: u64,

    /// Echo the first N characters of the extracted text (0 = off).
    #[arg(long, env = "PDFQUIZ_PREVIEW", default_value_t = 0)]
    preview: usize,

    /// Max LLM output tokens per reply.
    #[arg(long, env = "PDFQUIZ_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFQUIZ_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Retries when a generation request cannot be opened.
    #[arg(long, env = "PDFQUIZ_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Idle timeout in seconds for LLM replies.
    #[arg(long, env = "PDFQUIZ_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Wait for complete replies instead of streaming them.
    #[arg(long, env = "PDFQUIZ_NO_STREAM")]
    no_stream: bool,

    /// Write the session transcript as JSON to this file on exit.
    #[arg(long, env = "PDFQUIZ_TRANSCRIPT")]
    transcript: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFQUIZ_VERBOSE")]
    verbose: bool,

    /// Suppress logs and spinners.
    #[arg(short, long, env = "PDFQUIZ_QUIET")]
    quiet: bool,
}

/// What a typed line means.
#[derive(Debug, PartialEq)]
enum Input {
    Upload(PathBuf),
    QuizButton,
    Quit,
    Text(String),
    Blank,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    if let Some(rest) = line.strip_prefix("/upload") {
        return Input::Upload(PathBuf::from(unquote(rest.trim())));
    }
    match line {
        "/quiz" => return Input::QuizButton,
        "/quit" | "/exit" => return Input::Quit,
        _ => {}
    }
    // Dragging a file into most terminals pastes its (possibly quoted) path.
    // Only an existing file counts, so "summarize notes.pdf" stays a message.
    let bare = unquote(line);
    if bare.to_ascii_lowercase().ends_with(".pdf") && Path::new(bare).is_file() {
        return Input::Upload(PathBuf::from(bare));
    }
    Input::Text(line.to_string())
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| s.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(s)
}

enum NextLine {
    Line(String),
    TimedOut,
    Eof,
}

async fn next_line(
    lines: &mut Lines<BufReader<Stdin>>,
    conversation: &Conversation,
) -> Result<NextLine> {
    let line = match conversation.upload_deadline() {
        Some(_) => match within_deadline(conversation.policy(), lines.next_line()).await {
            Ok(line) => line.context("Failed to read stdin")?,
            Err(_) => return Ok(NextLine::TimedOut),
        },
        None => lines.next_line().await.context("Failed to read stdin")?,
    };
    Ok(line.map(NextLine::Line).unwrap_or(NextLine::Eof))
}

/// Drive `turn` to completion unless `stop` resolves first.
///
/// Returns `false` when the turn was cut short; the turn future is dropped,
/// which cancels any extraction wait or open LLM stream inside it.
async fn until_interrupted<T, S>(turn: T, stop: S) -> bool
where
    T: Future<Output = ()>,
    S: Future,
{
    tokio::select! {
        _ = turn => true,
        _ = stop => false,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // stdout is the chat; logs go to stderr and stay quiet unless asked for.
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build collaborators ──────────────────────────────────────────────
    let config = build_config(&cli)?;
    let extractor = PdfiumExtractor::new().context("Failed to load the PDF engine")?;
    let generator =
        LlmGenerator::from_config(&config).context("Failed to set up the LLM provider")?;
    if !cli.quiet {
        eprintln!(
            "{}",
            dim(&format!(
                "model: {} ({})",
                generator.model(),
                generator.provider_name()
            ))
        );
    }

    let sink = TerminalSink::new(!cli.quiet);
    let store = Arc::new(SessionStore::new());
    let mut chat = Conversation::start(
        &config,
        store,
        Arc::new(extractor),
        Arc::new(generator),
        sink.clone(),
    )
    .await;

    // ctrl-c ends the chat whether it is waiting for input or mid-turn.
    let mut interrupted = false;
    if let Some(ref path) = cli.input {
        interrupted =
            !until_interrupted(upload(&mut chat, path.clone()), tokio::signal::ctrl_c()).await;
    }

    // ── Chat loop ────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !interrupted {
        print!("{} ", bold("›"));
        io::stdout().flush().ok();

        let next = tokio::select! {
            next = next_line(&mut lines, &chat) => next?,
            _ = tokio::signal::ctrl_c() => NextLine::Eof,
        };

        let finished = match next {
            NextLine::Eof => break,
            NextLine::TimedOut => {
                println!();
                until_interrupted(
                    async {
                        chat.dispatch(ChatEvent::UploadTimedOut).await;
                    },
                    tokio::signal::ctrl_c(),
                )
                .await
            }
            NextLine::Line(line) => match parse_input(&line) {
                Input::Blank => true,
                Input::Quit => break,
                Input::Upload(path) => {
                    until_interrupted(upload(&mut chat, path), tokio::signal::ctrl_c()).await
                }
                Input::QuizButton => {
                    until_interrupted(
                        async {
                            chat.dispatch(ChatEvent::Action(ChatAction::CreateQuiz)).await;
                        },
                        tokio::signal::ctrl_c(),
                    )
                    .await
                }
                Input::Text(text) => {
                    until_interrupted(
                        async {
                            chat.dispatch(ChatEvent::Message(text)).await;
                        },
                        tokio::signal::ctrl_c(),
                    )
                    .await
                }
            },
        };
        interrupted = !finished;
    }

    if interrupted {
        sink.stop_spinner();
        println!();
    }

    let transcript = chat.end().await;
    if let Some(ref path) = cli.transcript {
        let json =
            serde_json::to_string_pretty(&transcript).context("Failed to serialise transcript")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write transcript to {:?}", path))?;
        if !cli.quiet {
            eprintln!("{}", dim(&format!("transcript saved to {}", path.display())));
        }
    }

    Ok(())
}

/// Load `path` from disk and hand it to the conversation.
async fn upload(chat: &mut Conversation, path: PathBuf) {
    match load_document(&path, chat.policy()).await {
        Ok(doc) => {
            chat.dispatch(ChatEvent::Upload(doc)).await;
        }
        Err(e) => chat.reject_upload(e),
    }
}

/// Map CLI args to `AssistantConfig`.
fn build_config(cli: &Cli) -> Result<AssistantConfig> {
    let mut config = AssistantConfig::builder()
        .max_upload_mb(cli.max_upload_mb)
        .upload_timeout_secs(cli.upload_timeout)
        .min_quiz_questions(cli.questions as usize)
        .preview_chars(cli.preview)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .stream(!cli.no_stream)
        .build()
        .context("Invalid configuration")?;

    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();

    Ok(config)
}
