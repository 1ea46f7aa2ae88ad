//! Document Text Extractor: PDF, DOCX or plain text bytes to a string.
//!
//! Pure and CPU-bound; callers run it through `extract_text_blocking` so the
//! async runtime is not stalled. A corrupted PDF or DOCX yields empty text
//! rather than an error; the caller decides what empty means.

pub mod docx;

use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            DocumentKind::Pdf
        } else if lower.ends_with(".docx") {
            DocumentKind::Docx
        } else {
            DocumentKind::Text
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Extracts text synchronously. Format is chosen by file extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
    match DocumentKind::from_filename(filename) {
        DocumentKind::Pdf => Ok(extract_pdf(bytes, filename)),
        DocumentKind::Docx => Ok(docx::extract_docx(bytes).unwrap_or_else(|e| {
            error!("Error reading DOCX '{filename}': {e}");
            String::new()
        })),
        DocumentKind::Text => String::from_utf8(bytes.to_vec())
            .map_err(|_| ExtractError::UnsupportedFormat(filename.to_string())),
    }
}

/// Runs `extract_text` on the blocking pool. A panic inside a parser is
/// treated as a corrupted document.
pub async fn extract_text_blocking(bytes: bytes::Bytes, filename: String) -> Result<String, ExtractError> {
    let name = filename.clone();
    match tokio::task::spawn_blocking(move || extract_text(&bytes, &filename)).await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            warn!("Text extraction panicked for '{name}'; treating document as unreadable");
            Ok(String::new())
        }
        Err(join_err) => Err(ExtractError::ExtractionFailed(join_err.to_string())),
    }
}

/// Per-page text joined by newlines in page order. Pages without text become
/// empty lines.
fn extract_pdf(bytes: &[u8], filename: &str) -> String {
    match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(pages) => pages
            .iter()
            .map(|p| p.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            error!("Error reading PDF '{filename}': {e}");
            String::new()
        }
    }
}
