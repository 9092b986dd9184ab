//! Upload handling: validate a submitted file and stage it for extraction.
//!
//! ## Why stage to a temp file?
//!
//! pdfium opens documents from a file-system path. Writing the upload to a
//! `NamedTempFile` gives the extractor a path while guaranteeing cleanup when
//! the [`StagedDocument`] is dropped, which happens when the session's
//! document is replaced or the session ends.
//!
//! Every check here runs before extraction, so an oversize or mislabelled
//! file never reaches pdfium.

use crate::config::{AssistantConfig, PDF_MIME};
use crate::document::Document;
use crate::error::{AssistantError, RejectReason, TurnError};
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Constraints applied to every upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub accepted_mime_types: Vec<String>,
    pub timeout: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&AssistantConfig::default())
    }
}

impl UploadPolicy {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            accepted_mime_types: config.accepted_mime_types.clone(),
            timeout: config.upload_timeout(),
        }
    }

    /// Reject sizes above the limit. Usable before the bytes are read.
    pub fn check_size(&self, size: u64) -> Result<(), TurnError> {
        if size > self.max_bytes {
            return Err(TurnError::UploadRejected(RejectReason::TooLarge {
                size,
                max: self.max_bytes,
            }));
        }
        Ok(())
    }

    fn accepts_mime(&self, mime: &str) -> bool {
        // Ignore parameters such as "; charset=binary".
        let essence = mime.split(';').next().unwrap_or("").trim();
        self.accepted_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(essence))
    }

    /// Validate a submitted document: type, size, emptiness and PDF magic bytes.
    pub fn validate(&self, doc: &Document) -> Result<(), TurnError> {
        let result = self.validate_inner(doc);
        if let Err(ref e) = result {
            warn!("Rejected upload '{}': {}", doc.name, e);
        }
        result
    }

    fn validate_inner(&self, doc: &Document) -> Result<(), TurnError> {
        if !self.accepts_mime(&doc.mime) {
            return Err(TurnError::UploadRejected(RejectReason::WrongType {
                mime: doc.mime.clone(),
            }));
        }
        self.check_size(doc.size())?;
        if doc.bytes.is_empty() {
            return Err(TurnError::UploadRejected(RejectReason::Empty));
        }
        let magic = doc.magic();
        if &magic != b"%PDF" {
            return Err(TurnError::UploadRejected(RejectReason::NotAPdf { magic }));
        }
        Ok(())
    }
}

/// Await `upload` for at most the policy timeout.
///
/// Elapsing yields `UploadRejected(Timeout)`, which the controller answers
/// with a fresh upload prompt.
pub async fn within_deadline<F, T>(policy: &UploadPolicy, upload: F) -> Result<T, TurnError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(policy.timeout, upload)
        .await
        .map_err(|_| {
            TurnError::UploadRejected(RejectReason::Timeout {
                secs: policy.timeout.as_secs(),
            })
        })
}

/// Read a local file into a [`Document`].
///
/// The size is checked from file metadata first, so an oversize file is
/// rejected without being read. The MIME type is guessed from the extension.
pub async fn load_document(path: &Path, policy: &UploadPolicy) -> Result<Document, TurnError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| TurnError::Extraction {
            name: name.clone(),
            detail: e.to_string(),
        })?;
    if !meta.is_file() {
        return Err(TurnError::Extraction {
            name,
            detail: "not a regular file".into(),
        });
    }
    policy.check_size(meta.len())?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| TurnError::Extraction {
            name: name.clone(),
            detail: e.to_string(),
        })?;

    let mime = guess_mime(path);
    debug!("Loaded '{}' ({} bytes, {})", name, bytes.len(), mime);
    Ok(Document::new(name, mime, bytes))
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// A validated upload written to a temporary file.
///
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct StagedDocument {
    name: String,
    file: NamedTempFile,
}

impl StagedDocument {
    /// Write `doc` to a fresh temporary file.
    pub fn stage(doc: &Document) -> Result<Self, AssistantError> {
        let mut file = tempfile::Builder::new()
            .prefix("pdfquiz-")
            .suffix(if doc.mime == PDF_MIME { ".pdf" } else { ".bin" })
            .tempfile()
            .map_err(|e| AssistantError::Internal(format!("tempfile: {e}")))?;
        file.write_all(&doc.bytes)
            .and_then(|_| file.flush())
            .map_err(|e| AssistantError::Internal(format!("tempfile write: {e}")))?;
        info!("Staged '{}' at {}", doc.name, file.path().display());
        Ok(Self {
            name: doc.name.clone(),
            file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn pdf(bytes: &[u8]) -> Document {
        Document::new("doc.pdf", PDF_MIME, bytes.to_vec())
    }

    #[test]
    fn accepts_small_pdf() {
        let policy = UploadPolicy::default();
        assert_ok!(policy.validate(&pdf(b"%PDF-1.7 ...")));
    }

    #[test]
    fn rejects_wrong_mime() {
        let policy = UploadPolicy::default();
        let doc = Document::new("notes.txt", "text/plain", b"%PDF".to_vec());
        assert!(matches!(
            policy.validate(&doc),
            Err(TurnError::UploadRejected(RejectReason::WrongType { .. }))
        ));
    }

    #[test]
    fn mime_parameters_and_case_are_ignored() {
        let policy = UploadPolicy::default();
        let doc = Document::new("a.pdf", "Application/PDF; charset=binary", b"%PDF-1.4".to_vec());
        assert_ok!(policy.validate(&doc));
    }

    #[test]
    fn rejects_oversize() {
        let policy = UploadPolicy {
            max_bytes: 8,
            ..UploadPolicy::default()
        };
        let err = policy.validate(&pdf(b"%PDF-1.7 too long")).unwrap_err();
        assert_eq!(
            err,
            TurnError::UploadRejected(RejectReason::TooLarge { size: 17, max: 8 })
        );
    }

    #[test]
    fn rejects_empty_and_non_pdf_content() {
        let policy = UploadPolicy::default();
        assert_eq!(
            policy.validate(&pdf(b"")).unwrap_err(),
            TurnError::UploadRejected(RejectReason::Empty)
        );
        assert!(matches!(
            policy.validate(&pdf(b"PK\x03\x04zip")),
            Err(TurnError::UploadRejected(RejectReason::NotAPdf { .. }))
        ));
    }

    #[tokio::test]
    async fn deadline_elapses_into_timeout_rejection() {
        let policy = UploadPolicy {
            timeout: Duration::from_millis(10),
            ..UploadPolicy::default()
        };
        let err = within_deadline(&policy, std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::UploadRejected(RejectReason::Timeout { .. })
        ));
    }

    #[test]
    fn deadline_passes_ready_value_through() {
        let policy = UploadPolicy::default();
        let v = tokio_test::block_on(within_deadline(&policy, async { 42 }));
        assert_eq!(assert_ok!(v), 42);
    }

    #[tokio::test]
    async fn load_document_checks_size_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.pdf");
        std::fs::write(&path, vec![b'x'; 64]).unwrap();

        let policy = UploadPolicy {
            max_bytes: 16,
            ..UploadPolicy::default()
        };
        assert!(matches!(
            load_document(&path, &policy).await,
            Err(TurnError::UploadRejected(RejectReason::TooLarge { size: 64, .. }))
        ));
    }

    #[tokio::test]
    async fn load_document_guesses_pdf_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.5").unwrap();

        let doc = load_document(&path, &UploadPolicy::default()).await.unwrap();
        assert_eq!(doc.name, "paper.pdf");
        assert_eq!(doc.mime, PDF_MIME);
        assert_eq!(doc.bytes, b"%PDF-1.5");
    }

    #[tokio::test]
    async fn load_document_missing_file() {
        let err = assert_err!(
            load_document(Path::new("/definitely/not/a/real/file.pdf"), &UploadPolicy::default()).await
        );
        assert!(matches!(err, TurnError::Extraction { .. }));
    }

    #[test]
    fn staged_file_is_removed_on_drop() {
        let staged = StagedDocument::stage(&pdf(b"%PDF-1.7")).unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
        assert_eq!(staged.name(), "doc.pdf");
        drop(staged);
        assert!(!path.exists());
    }
}
