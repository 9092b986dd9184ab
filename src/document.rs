//! Uploaded documents and the text recovered from them.

use crate::pipeline::extract::join_pages;
use serde::Serialize;
use std::fmt;

/// A file submitted by the user.
///
/// Lives for one session at most; the upload handler stages a copy on disk
/// for the extractor and discards it when the session moves on.
#[derive(Clone)]
pub struct Document {
    /// Display name, usually the original file name.
    pub name: String,
    /// MIME type declared by the client (or guessed from the extension).
    pub mime: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// First four bytes, zero-padded for shorter files.
    pub fn magic(&self) -> [u8; 4] {
        let mut magic = [0u8; 4];
        let n = self.bytes.len().min(4);
        magic[..n].copy_from_slice(&self.bytes[..n]);
        magic
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// The full plain text of a document, pages joined in order.
///
/// Built once per upload and never mutated; sessions hold it behind an `Arc`.
/// Pages without any text are skipped, see [`join_pages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    text: String,
    page_count: usize,
    pages_with_text: usize,
}

impl ExtractedText {
    /// Join raw page texts (in page order) into an `ExtractedText`.
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pages: Vec<S> = pages.into_iter().collect();
        let page_count = pages.len();
        let (text, pages_with_text) = join_pages(pages.iter().map(|p| p.as_ref()));
        Self {
            text,
            page_count,
            pages_with_text,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of pages in the source document.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of pages that contributed text.
    pub fn pages_with_text(&self) -> usize {
        self.pages_with_text
    }

    /// The first `max_chars` characters, with an ellipsis when cut short.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}…", &self.text[..cut]),
            None => self.text.clone(),
        }
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
