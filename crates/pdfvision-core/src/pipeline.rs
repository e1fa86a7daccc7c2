//! Page-by-page OCR extraction.

use std::path::Path;

use crate::backend::PdfBackend;
use crate::ocr::OcrClient;
use crate::render::{RenderOptions, encode_png};
use crate::{ExtractError, Extraction, PageOutcome, ProgressEvent};

/// Run the page loop against an already-configured OCR client.
///
/// Pages are handled strictly in order, one at a time: render, encode as
/// PNG, submit, classify. In-band API errors and empty pages are reported
/// through `progress` and skipped. Render, encode and transport errors
/// abort the run. The document is closed when this returns, on every path.
pub async fn extract_with_client<F>(
    path: &Path,
    client: &dyn OcrClient,
    backend: &dyn PdfBackend,
    render: RenderOptions,
    progress: F,
) -> Result<Extraction, ExtractError>
where
    F: Fn(ProgressEvent),
{
    let document = backend.open(path)?;
    let total = document.page_count()?;
    let scale = render.scale();

    tracing::info!(path = %path.display(), pages = total, scale, "processing document");
    progress(ProgressEvent::Processing { total_pages: total });

    let mut pages = Vec::with_capacity(total);
    for index in 0..total {
        let png = {
            let bitmap = document.render_page(index, scale)?;
            tracing::debug!(
                page = index + 1,
                width = bitmap.width,
                height = bitmap.height,
                "rendered page"
            );
            encode_png(&bitmap)?
        };

        let response = client.detect_document_text(&png).await?;
        let outcome = response.into_outcome();

        match &outcome {
            PageOutcome::Text(text) => {
                let chars = text.chars().count();
                tracing::debug!(page = index + 1, chars, "page recognized");
                progress(ProgressEvent::PageText {
                    index,
                    total,
                    chars,
                });
            }
            PageOutcome::ApiError(message) => {
                tracing::warn!(page = index + 1, error = %message, ocr = client.name(), "API error");
                progress(ProgressEvent::PageApiError {
                    index,
                    total,
                    message: message.clone(),
                });
            }
            PageOutcome::NoText => {
                tracing::debug!(page = index + 1, "no text found");
                progress(ProgressEvent::PageNoText { index, total });
            }
        }
        pages.push(outcome);
    }
    drop(document);

    let extraction = Extraction::from_pages(pages);
    let total_chars = extraction.char_count();
    tracing::info!(
        pages = total,
        pages_with_text = extraction.pages_with_text(),
        total_chars,
        "extraction complete"
    );
    progress(ProgressEvent::Done { total_chars });

    Ok(extraction)
}
