//! OCR client trait and the per-page response shape it returns.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::PageOutcome;

/// Transport, authentication or decoding failure talking to the OCR service.
///
/// These are infrastructure errors and abort an extraction. Errors the
/// service reports in-band for a single image are carried in
/// [`OcrResponse::error_message`] instead.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// What the OCR service returned for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrResponse {
    /// In-band error reported by the service for this image.
    pub error_message: Option<String>,
    /// Full-document text annotation, if any was produced.
    pub full_text: Option<String>,
}

impl OcrResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            error_message: None,
            full_text: Some(text.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            full_text: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Classify the response. An in-band error wins over any text; an
    /// annotation with empty text counts as no text.
    pub fn into_outcome(self) -> PageOutcome {
        match (self.error_message, self.full_text) {
            (Some(message), _) if !message.is_empty() => PageOutcome::ApiError(message),
            (_, Some(text)) if !text.is_empty() => PageOutcome::Text(text),
            _ => PageOutcome::NoText,
        }
    }
}

/// An OCR service that turns a PNG image into dense document text.
pub trait OcrClient: Send + Sync {
    /// Human-readable name of the service (e.g., "Cloud Vision").
    fn name(&self) -> &str;

    /// Submit one PNG-encoded image for full-document text detection.
    fn detect_document_text<'a>(
        &'a self,
        png: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<OcrResponse, OcrError>> + Send + 'a>>;
}
