//! Mock PDF renderer and OCR client for testing.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{BackendError, Bitmap, PdfBackend, PdfDocument};
use crate::ocr::{OcrClient, OcrError, OcrResponse};

/// A configurable mock response for [`MockOcr`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Recognized full text.
    Text(String),
    /// In-band error reported for the image.
    ApiError(String),
    /// Answer without a text annotation.
    NoText,
    /// Transport-level failure.
    Fail(String),
}

/// A hand-rolled mock implementing [`OcrClient`] for tests.
///
/// Returns responses in order, repeating the last one once the sequence is
/// exhausted, and counts calls.
pub struct MockOcr {
    /// Reversed so the next response can be popped off the end.
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    call_count: AtomicUsize,
    image_sizes: Mutex<Vec<usize>>,
}

impl MockOcr {
    /// Create a mock that always returns `response`.
    pub fn new(response: MockResponse) -> Self {
        Self::with_sequence(vec![response])
    }

    /// Create a mock that returns responses in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<MockResponse>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        responses.reverse();
        let fallback = responses.first().cloned().unwrap();
        Self {
            responses: Mutex::new(responses),
            fallback,
            call_count: AtomicUsize::new(0),
            image_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: one text response per page.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_sequence(
            texts
                .into_iter()
                .map(|t| MockResponse::Text(t.into()))
                .collect(),
        )
    }

    /// How many times `detect_document_text()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Byte length of every image submitted so far.
    pub fn image_sizes(&self) -> Vec<usize> {
        self.image_sizes.lock().unwrap().clone()
    }

    fn next_response(&self) -> MockResponse {
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl OcrClient for MockOcr {
    fn name(&self) -> &str {
        "mock"
    }

    fn detect_document_text<'a>(
        &'a self,
        png: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<OcrResponse, OcrError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.image_sizes.lock().unwrap().push(png.len());
        let response = self.next_response();

        Box::pin(async move {
            match response {
                MockResponse::Text(text) => Ok(OcrResponse::text(text)),
                MockResponse::ApiError(message) => Ok(OcrResponse::error(message)),
                MockResponse::NoText => Ok(OcrResponse::empty()),
                MockResponse::Fail(message) => Err(OcrError::Http {
                    status: 503,
                    message,
                }),
            }
        })
    }
}

/// How a [`MockPdf`] page behaves when rendered.
#[derive(Clone, Debug)]
pub enum MockPage {
    /// Render a white bitmap of the page size (in 72-DPI points) times the scale.
    Blank { width_pt: f32, height_pt: f32 },
    /// Fail to render.
    Broken(String),
}

impl MockPage {
    /// A US Letter page.
    pub fn letter() -> Self {
        MockPage::Blank {
            width_pt: 612.0,
            height_pt: 792.0,
        }
    }
}

#[derive(Default)]
struct MockPdfState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    renders: Mutex<Vec<(usize, f32)>>,
}

/// A hand-rolled mock implementing [`PdfBackend`] for tests.
pub struct MockPdf {
    pages: Vec<MockPage>,
    open_error: Option<String>,
    state: Arc<MockPdfState>,
}

impl MockPdf {
    pub fn new(pages: Vec<MockPage>) -> Self {
        Self {
            pages,
            open_error: None,
            state: Arc::new(MockPdfState::default()),
        }
    }

    /// A document of `count` letter-sized pages.
    pub fn with_pages(count: usize) -> Self {
        Self::new(vec![MockPage::letter(); count])
    }

    /// A backend whose `open()` always fails.
    pub fn failing_open(message: &str) -> Self {
        Self {
            open_error: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// How many opened documents have been dropped.
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// `(page index, scale)` for every render call, in call order.
    pub fn renders(&self) -> Vec<(usize, f32)> {
        self.state.renders.lock().unwrap().clone()
    }
}

impl PdfBackend for MockPdf {
    fn open(&self, _path: &Path) -> Result<Box<dyn PdfDocument>, BackendError> {
        if let Some(message) = &self.open_error {
            return Err(BackendError::OpenError(message.clone()));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDocument {
            pages: self.pages.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockDocument {
    pages: Vec<MockPage>,
    state: Arc<MockPdfState>,
}

impl PdfDocument for MockDocument {
    fn page_count(&self) -> Result<usize, BackendError> {
        Ok(self.pages.len())
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<Bitmap, BackendError> {
        self.state.renders.lock().unwrap().push((index, scale));
        match self.pages.get(index) {
            Some(MockPage::Blank {
                width_pt,
                height_pt,
            }) => {
                // Keep test bitmaps small; only the call arguments matter.
                let width = ((width_pt * scale) / 100.0).ceil().max(1.0) as u32;
                let height = ((height_pt * scale) / 100.0).ceil().max(1.0) as u32;
                Ok(Bitmap::filled(width, height, [255, 255, 255]))
            }
            Some(MockPage::Broken(message)) => Err(BackendError::RenderError {
                page: index,
                message: message.clone(),
            }),
            None => Err(BackendError::RenderError {
                page: index,
                message: "page index out of range".into(),
            }),
        }
    }
}

impl Drop for MockDocument {
    fn drop(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
