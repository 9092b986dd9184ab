//! Prompts and fixed chat copy.
//!
//! Every string the assistant sends to the model or shows the user without
//! generating it lives here, so wording changes touch exactly one file and
//! tests can inspect prompts without a live model.

use once_cell::sync::Lazy;
use regex::Regex;

/// Author name shown on generated replies.
pub const ASSISTANT_NAME: &str = "PDF Assistant";

/// Label of the clickable quiz action.
pub const CREATE_QUIZ_LABEL: &str = "Create Quiz";

pub const WELCOME: &str = "Hello! Upload a PDF to get started. I will summarize it for you.";

pub const UPLOAD_PROMPT: &str = "Please upload a PDF file to begin!";

pub const SUMMARY_HEADER: &str = "📄 Analyzing your PDF...\n\n**Summary:**\n";

pub const QUIZ_OFFER: &str = "Would you like me to create a quiz from this content? \
Type 'Create Quiz' or click the button below.";

pub const QUIZ_PENDING: &str = "📝 Generating quiz questions...";

pub const QUIZ_HEADER: &str = "**Quiz:**\n";

pub const QUIZ_DONE: &str = "Quiz generated!";

/// Reply to free text that is not a recognised command.
pub const GUIDANCE: &str =
    "Please upload a PDF or type 'Create Quiz' to get questions from the last PDF.";

/// Reply to a quiz request when the session has no document yet.
pub const MISSING_DOCUMENT: &str = "Please upload a PDF first to generate a quiz.";

static RE_TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Tidy extracted text before it is embedded in a prompt.
///
/// CRLF/CR become LF, trailing whitespace is trimmed per line, runs of blank
/// lines collapse to one, invisible characters are removed, and leading or
/// trailing blank lines are dropped. The stored document text is untouched.
pub fn prompt_text(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\0'],
        "",
    );
    let s = RE_TRAILING_WS.replace_all(&s, "");
    let s = RE_BLANK_RUNS.replace_all(&s, "\n\n");
    s.trim_matches('\n').to_string()
}

/// Build the summary request for the extracted document text.
pub fn summary_prompt(text: &str) -> String {
    let text = prompt_text(text);
    format!(
        "Summarize the following PDF text. Cover the main topics and key points \
in clear prose, in the language of the document.\n\n\"\"\"\n{text}\n\"\"\""
    )
}

/// Build the quiz request for the extracted document text.
///
/// The shape requirement is fixed: at least `min_questions` numbered
/// questions, each with exactly four options labelled A–D and the correct
/// option marked.
pub fn quiz_prompt(text: &str, min_questions: usize) -> String {
    let text = prompt_text(text);
    format!(
        "Generate a multiple choice quiz with at least {min_questions} questions \
based only on the text below.\n\
Rules:\n\
- Number every question as \"Question 1:\", \"Question 2:\", and so on.\n\
- Give each question exactly 4 options, one per line, labelled \"A)\", \"B)\", \"C)\" and \"D)\".\n\
- After the options, clearly mark the correct answer on its own line as \"Correct answer: <letter>\".\n\
\n\"\"\"\n{text}\n\"\"\""
    )
}

/// Notice posted before extraction starts.
pub fn processing_notice(name: &str) -> String {
    format!("Processing `{name}`...")
}

/// Preview of the extracted text posted after a successful upload.
pub fn preview_message(pages_with_text: usize, page_count: usize, preview: &str) -> String {
    format!("📄 Extracted text from {pages_with_text}/{page_count} pages:\n\n{preview}")
}

/// Visible terminal message for a failed generation.
pub fn generation_failed(detail: &str) -> String {
    format!("⚠️ Sorry, the response could not be completed: {detail}")
}
