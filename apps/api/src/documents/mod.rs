//! Document ingestion: uploaded résumés and job descriptions to plain text,
//! plus model-assisted field extraction from that text.

use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;

pub mod extract;
pub mod handlers;

const PDF_MEDIA_TYPE: &str = "application/pdf";
const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to parse file {file_name}: {reason}")]
    ParseFailure { file_name: String, reason: String },
}

impl DocumentError {
    fn parse_failure(file_name: &str, reason: impl Into<String>) -> Self {
        DocumentError::ParseFailure {
            file_name: file_name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        AppError::UnprocessableEntity(err.to_string())
    }
}

/// Converts a binary document to plain text.
pub trait DocumentConverter: Send + Sync {
    fn convert(
        &self,
        data: &[u8],
        media_type: Option<&str>,
        file_name: &str,
    ) -> Result<String, DocumentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

fn classify(media_type: Option<&str>, file_name: &str) -> DocumentKind {
    let name = file_name.to_lowercase();
    match media_type {
        Some(PDF_MEDIA_TYPE) => DocumentKind::Pdf,
        Some(DOCX_MEDIA_TYPE) => DocumentKind::Docx,
        _ if name.ends_with(".pdf") => DocumentKind::Pdf,
        _ if name.ends_with(".docx") => DocumentKind::Docx,
        _ => DocumentKind::Text,
    }
}

/// PDF through `pdf-extract`; everything else except DOCX is read as
/// lossy UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

impl DocumentConverter for TextConverter {
    fn convert(
        &self,
        data: &[u8],
        media_type: Option<&str>,
        file_name: &str,
    ) -> Result<String, DocumentError> {
        let kind = classify(media_type, file_name);
        debug!("Converting {file_name} as {kind:?} ({} bytes)", data.len());

        let text = match kind {
            DocumentKind::Pdf => pdf_extract::extract_text_from_mem(data)
                .map_err(|e| DocumentError::parse_failure(file_name, e.to_string()))?,
            DocumentKind::Docx => {
                return Err(DocumentError::parse_failure(
                    file_name,
                    "DOCX documents are not supported; upload a PDF or plain text file",
                ))
            }
            DocumentKind::Text => String::from_utf8_lossy(data).into_owned(),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(DocumentError::parse_failure(file_name, "no text found"));
        }
        Ok(text.to_string())
    }
}
