//! Pipeline stages behind the conversation.
//!
//! ```text
//! upload ──▶ extract ──▶ generate
//! (validate,  (pdfium,    (LLM, whole or
//!  stage)      join)       fragment stream)
//! ```
//!
//! 1. [`upload`]: validate type/size/magic bytes, enforce the upload
//!    timeout, stage the file in a temp file
//! 2. [`extract`]: read every page's text; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`generate`]: drive the model with retry/backoff; the only stage with
//!    network I/O

pub mod extract;
pub mod generate;
pub mod upload;
