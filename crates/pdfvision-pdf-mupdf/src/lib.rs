use std::path::Path;

use mupdf::{Colorspace, Document, Matrix};

use pdfvision_core::{BackendError, Bitmap, PdfBackend, PdfDocument};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the pipeline and OCR client do not
/// transitively depend on it.
///
/// Pages are rasterized to RGB without an alpha channel; no rotation,
/// cropping or annotation rendering options are applied.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for MupdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        Ok(Box::new(MupdfDocument { document }))
    }
}

struct MupdfDocument {
    document: Document,
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> Result<usize, BackendError> {
        let count = self
            .document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<Bitmap, BackendError> {
        let render_err = |e: mupdf::Error| BackendError::RenderError {
            page: index,
            message: e.to_string(),
        };

        let page = self.document.load_page(index as i32).map_err(render_err)?;
        let matrix = Matrix::new_scale(scale, scale);
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)
            .map_err(render_err)?;

        let width = pixmap.width() as u32;
        let height = pixmap.height() as u32;
        let samples = pack_rgb_rows(pixmap.samples(), width, height).ok_or_else(|| {
            BackendError::RenderError {
                page: index,
                message: format!(
                    "unexpected pixmap layout: {} bytes for {}x{} RGB",
                    pixmap.samples().len(),
                    width,
                    height
                ),
            }
        })?;

        Ok(Bitmap {
            width,
            height,
            samples,
        })
    }
}

/// Copy RGB rows out of a possibly padded sample buffer.
fn pack_rgb_rows(samples: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let row_len = width as usize * 3;
    let height = height as usize;
    if height == 0 {
        return Some(Vec::new());
    }

    let stride = samples.len() / height;
    if stride < row_len {
        return None;
    }
    if stride == row_len {
        return Some(samples[..row_len * height].to_vec());
    }

    let mut packed = Vec::with_capacity(row_len * height);
    for row in samples.chunks(stride).take(height) {
        packed.extend_from_slice(&row[..row_len]);
    }
    Some(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tight_rows_are_copied_as_is() {
        let samples: Vec<u8> = (0..12).collect();
        assert_eq!(pack_rgb_rows(&samples, 2, 2), Some(samples));
    }

    #[test]
    fn padded_rows_are_trimmed() {
        // 1 pixel wide, 2 rows, 1 padding byte per row.
        let samples = vec![1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(pack_rgb_rows(&samples, 1, 2), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert_eq!(pack_rgb_rows(&[0; 5], 2, 1), None);
    }

    #[test]
    fn missing_file_is_open_error() {
        let result = MupdfBackend::new().open(Path::new("/nonexistent/pdfvision/input.pdf"));
        assert!(matches!(result, Err(BackendError::OpenError(_))));
    }
}
