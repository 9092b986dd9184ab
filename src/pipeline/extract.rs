//! Text extraction: recover the plain text of every page via pdfium.
//!
//! ## Page policy
//!
//! Page texts are joined in page order with a single `\n`, exactly as pdfium
//! returned them apart from one final line break per page. Pages with no
//! visible text (scanned pages, blank separator pages, figure-only pages) are
//! **skipped**: they contribute neither a blank segment nor a dangling
//! separator. Cleanup for the model happens later, in prompt building.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on Tokio worker threads. All pdfium calls happen
//! inside `tokio::task::spawn_blocking`.

use crate::document::ExtractedText;
use crate::error::{AssistantError, TurnError};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a staged document into text.
///
/// The seam between the conversation and the PDF library; tests substitute
/// an in-memory implementation.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract all page texts of the file at `path`.
    ///
    /// `name` is only used for error messages.
    async fn extract(&self, path: &Path, name: &str) -> Result<ExtractedText, TurnError>;
}

/// [`TextExtractor`] backed by the pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    library: Option<PathBuf>,
}

impl PdfiumExtractor {
    /// Locate pdfium and verify it can be loaded.
    ///
    /// `PDFIUM_LIB_PATH` may point at the library itself or at the directory
    /// containing it; otherwise the system loader path is searched.
    pub fn new() -> Result<Self, AssistantError> {
        let library = std::env::var_os("PDFIUM_LIB_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self::with_library(library)
    }

    /// Use an explicit library path (file or directory), or the system library when `None`.
    pub fn with_library(library: Option<PathBuf>) -> Result<Self, AssistantError> {
        let extractor = Self { library };
        extractor
            .bind()
            .map_err(|e| AssistantError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(extractor)
    }

    fn bind(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match &self.library {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))?
            }
            Some(path) => Pdfium::bind_to_library(path)?,
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }

    /// Blocking implementation of text extraction.
    fn extract_blocking(&self, pdf_path: &Path, name: &str) -> Result<ExtractedText, TurnError> {
        let pdfium = self.bind().map_err(|e| TurnError::Extraction {
            name: name.to_string(),
            detail: format!("pdfium unavailable: {e:?}"),
        })?;

        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            let detail = if err_str.contains("Password") || err_str.contains("password") {
                "the PDF is password protected".to_string()
            } else {
                format!("not a readable PDF ({err_str})")
            };
            TurnError::Extraction {
                name: name.to_string(),
                detail,
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let mut texts = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| TurnError::Extraction {
                    name: name.to_string(),
                    detail: format!("page {}: {:?}", idx + 1, e),
                })?
                .all();
            debug!("Page {}: {} chars", idx + 1, text.len());
            texts.push(text);
        }

        Ok(ExtractedText::from_pages(texts))
    }
}

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract(&self, path: &Path, name: &str) -> Result<ExtractedText, TurnError> {
        let this = self.clone();
        let path = path.to_path_buf();
        let name_owned = name.to_string();

        tokio::task::spawn_blocking(move || this.extract_blocking(&path, &name_owned))
            .await
            .map_err(|e| TurnError::Extraction {
                name: name.to_string(),
                detail: format!("extraction task panicked: {e}"),
            })?
    }
}

// ── Page joining ─────────────────────────────────────────────────────────────

/// Characters pdfium emits that carry no visible text.
const INVISIBLE: [char; 7] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\0',
];

/// True when a page holds nothing but whitespace and invisible characters.
pub fn is_blank_page(page: &str) -> bool {
    page.chars().all(|c| c.is_whitespace() || INVISIBLE.contains(&c))
}

/// Join page texts in order, skipping pages with no text.
///
/// Each kept page goes into the result unchanged apart from its final line
/// break, so pages are always separated by exactly one `\n`.
///
/// Returns the joined text and the number of pages that contributed to it.
pub fn join_pages<'a, I>(pages: I) -> (String, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    let mut used = 0;
    for page in pages {
        if is_blank_page(page) {
            continue;
        }
        let page = page
            .strip_suffix('\n')
            .map(|p| p.strip_suffix('\r').unwrap_or(p))
            .unwrap_or(page);
        if used > 0 {
            out.push('\n');
        }
        out.push_str(page);
        used += 1;
    }
    (out, used)
}
