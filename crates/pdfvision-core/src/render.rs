//! Render resolution and PNG encoding of page bitmaps.

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::backend::Bitmap;

/// PDF page space is defined at 72 units per inch.
pub const BASE_DPI: f32 = 72.0;

/// Resolution pages are rasterized at before OCR.
pub const DEFAULT_RENDER_DPI: f32 = 300.0;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("bitmap is {width}x{height} but has {actual} sample bytes (expected {expected})")]
    SampleLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("render DPI must be a finite number above zero, got {0}")]
pub struct InvalidDpi(pub f32);

/// Rendering configuration. The output DPI is the only tunable; color mode,
/// rotation and cropping are left at the renderer's defaults.
///
/// Always holds a finite, positive DPI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    dpi: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl RenderOptions {
    pub fn with_dpi(dpi: f32) -> Result<Self, InvalidDpi> {
        if dpi.is_finite() && dpi > 0.0 {
            Ok(Self { dpi })
        } else {
            Err(InvalidDpi(dpi))
        }
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    /// Linear zoom applied to every page: output DPI over the 72-DPI base.
    pub fn scale(&self) -> f32 {
        self.dpi / BASE_DPI
    }
}

/// Losslessly encode an RGB bitmap as PNG.
pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, EncodeError> {
    let expected = bitmap.width as usize * bitmap.height as usize * 3;
    if bitmap.samples.len() != expected {
        return Err(EncodeError::SampleLength {
            width: bitmap.width,
            height: bitmap.height,
            expected,
            actual: bitmap.samples.len(),
        });
    }

    let image = RgbImage::from_raw(bitmap.width, bitmap.height, bitmap.samples.clone()).ok_or(
        EncodeError::SampleLength {
            width: bitmap.width,
            height: bitmap.height,
            expected,
            actual: bitmap.samples.len(),
        },
    )?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
