use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to render page {page}: {message}")]
    RenderError { page: usize, message: String },
    #[error("PDF renderer unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A packed 8-bit RGB raster of one rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB samples, `width * height * 3` bytes, no row padding.
    pub samples: Vec<u8>,
}

impl Bitmap {
    /// A bitmap filled with a single color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut samples = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            samples.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            samples,
        }
    }
}

/// Trait for PDF rendering backends.
///
/// Implementors open a document and hand back a [`PdfDocument`]; the page
/// loop, PNG encoding and OCR submission live in [`crate::pipeline`].
pub trait PdfBackend: Send + Sync {
    /// Open the PDF at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, BackendError>;
}

/// An opened PDF. Dropping the handle closes the document.
pub trait PdfDocument {
    /// Number of pages in the document.
    fn page_count(&self) -> Result<usize, BackendError>;

    /// Render page `index` (0-based) with a uniform linear `scale` applied
    /// to the 72-DPI page space.
    fn render_page(&self, index: usize, scale: f32) -> Result<Bitmap, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_bitmap_has_packed_rgb_samples() {
        let bitmap = Bitmap::filled(4, 2, [255, 0, 10]);
        assert_eq!(bitmap.samples.len(), 4 * 2 * 3);
        assert_eq!(&bitmap.samples[..3], &[255, 0, 10]);
        assert_eq!(&bitmap.samples[21..], &[255, 0, 10]);
    }
}
