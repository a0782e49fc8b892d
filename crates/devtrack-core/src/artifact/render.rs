//! QR code rendering.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::{Error, Result};

/// Turns payload text into image bytes. Must be pure: same input, same output.
pub trait ArtifactRenderer: Send + Sync {
    fn render(&self, content: &str) -> Result<Vec<u8>>;

    /// MIME type of the rendered bytes.
    fn content_type(&self) -> &'static str {
        "image/png"
    }
}

/// Options for [`QrRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrOptions {
    /// Pixels per QR module.
    pub module_size: u32,
    /// Light border around the code, in modules.
    pub quiet_zone: u32,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            module_size: 8,
            quiet_zone: 4,
        }
    }
}

/// Renders black-on-white PNG QR codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrRenderer {
    options: QrOptions,
}

impl QrRenderer {
    #[must_use]
    pub const fn new(options: QrOptions) -> Self {
        Self { options }
    }
}

impl ArtifactRenderer for QrRenderer {
    fn render(&self, content: &str) -> Result<Vec<u8>> {
        if content.is_empty() {
            return Err(Error::Render("QR content cannot be empty".to_string()));
        }
        if self.options.module_size == 0 {
            return Err(Error::Render("QR module size must be greater than zero".to_string()));
        }

        let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::M)
            .map_err(|error| Error::Render(format!("Failed to encode QR code: {error}")))?;

        let image = rasterize(&code, self.options)?;
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|error| Error::Render(format!("Failed to encode QR image: {error}")))?;

        Ok(cursor.into_inner())
    }
}

fn rasterize(code: &QrCode, options: QrOptions) -> Result<GrayImage> {
    let modules = u32::try_from(code.width())
        .map_err(|_| Error::Render("QR code is too large".to_string()))?;
    let colors = code.to_colors();
    let span = modules + options.quiet_zone * 2;
    let side = span * options.module_size;

    Ok(GrayImage::from_fn(side, side, |x, y| {
        let column = (x / options.module_size).checked_sub(options.quiet_zone);
        let row = (y / options.module_size).checked_sub(options.quiet_zone);
        let dark = match (column, row) {
            (Some(column), Some(row)) if column < modules && row < modules => {
                colors[(row * modules + column) as usize] == Color::Dark
            }
            _ => false,
        };
        if dark {
            Luma([0])
        } else {
            Luma([255])
        }
    }))
}
