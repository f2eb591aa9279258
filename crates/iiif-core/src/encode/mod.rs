//! Output encoding.
//!
//! Output formats form a closed set ([`OutputFormat`]). Each format maps to
//! one [`FormatEncoder`] in an [`EncoderTable`]; adding a codec means
//! registering an encoder, not editing a conditional. The table is built
//! with encoders for jpg, png, webp, tif and pdf. jp2 is a valid format with
//! no built-in encoder and is rejected unless a caller registers one.
//!
//! Raster encoders do not get a say over resolution metadata, so the
//! pipeline patches DPI into the encoded container afterwards
//! ([`patch_resolution`]).

mod dpi;
mod pdf;
mod raster;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::DecodedImage;

pub use dpi::patch_resolution;
pub use pdf::PdfEncoder;
pub use raster::{encode_jpeg, JpegEncoder, PngEncoder, TiffEncoder, WebpEncoder};

/// Errors that can occur during encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The requested extension is not a known output format, or no encoder
    /// is registered for it.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// The underlying codec failed
    #[error("{format} encoding failed: {reason}")]
    EncodingFailed {
        format: OutputFormat,
        reason: String,
    },

    /// Encoded bytes are not a container we know how to patch
    #[error("Malformed {format} container: {reason}")]
    MalformedContainer {
        format: OutputFormat,
        reason: &'static str,
    },
}

impl EncodeError {
    pub(crate) fn failed(format: OutputFormat, err: impl fmt::Display) -> Self {
        EncodeError::EncodingFailed {
            format,
            reason: err.to_string(),
        }
    }
}

/// Output container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Png,
    Webp,
    Tif,
    Pdf,
    Jp2,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Jpg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Tif,
        OutputFormat::Pdf,
        OutputFormat::Jp2,
    ];

    /// Parse a request extension. Matching is case-insensitive.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(OutputFormat::Jpg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::Webp),
            "tif" | "tiff" => Some(OutputFormat::Tif),
            "pdf" => Some(OutputFormat::Pdf),
            "jp2" => Some(OutputFormat::Jp2),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Tif => "tif",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Jp2 => "jp2",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Tif => "image/tiff",
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Jp2 => "image/jp2",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Per-request encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Compression quality, 1 to 100. Lossless encoders ignore it.
    pub quality: u8,
    /// Horizontal and vertical resolution in dots per inch.
    pub dpi: (u16, u16),
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: 90,
            dpi: (crate::geometry::DEFAULT_DPI, crate::geometry::DEFAULT_DPI),
        }
    }
}

/// Serializes an RGBA raster into one output container.
pub trait FormatEncoder: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn encode(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError>;
}

/// Format to encoder dispatch table.
#[derive(Clone)]
pub struct EncoderTable {
    encoders: HashMap<OutputFormat, Arc<dyn FormatEncoder>>,
}

impl EncoderTable {
    /// Table with no encoders.
    pub fn empty() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    /// Table with the built-in encoders.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.register(JpegEncoder);
        table.register(PngEncoder);
        table.register(WebpEncoder);
        table.register(TiffEncoder);
        table.register(PdfEncoder);
        table
    }

    /// Register `encoder` for its format, replacing any previous one.
    pub fn register(&mut self, encoder: impl FormatEncoder + 'static) {
        self.encoders.insert(encoder.format(), Arc::new(encoder));
    }

    pub fn supports(&self, format: OutputFormat) -> bool {
        self.encoders.contains_key(&format)
    }

    /// Resolve a request extension to its format and encoder.
    pub fn encoder_for(&self, ext: &str) -> Result<(OutputFormat, &dyn FormatEncoder), EncodeError> {
        let format = OutputFormat::from_extension(ext)
            .ok_or_else(|| EncodeError::UnsupportedFormat(ext.to_string()))?;
        let encoder = self
            .encoders
            .get(&format)
            .ok_or_else(|| EncodeError::UnsupportedFormat(ext.to_string()))?;
        Ok((format, encoder.as_ref()))
    }
}

impl Default for EncoderTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for EncoderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<_> = self.encoders.keys().map(|f| f.extension()).collect();
        formats.sort_unstable();
        f.debug_struct("EncoderTable")
            .field("formats", &formats)
            .finish()
    }
}

/// Check dimensions and buffer length of an RGBA raster.
pub(crate) fn validate_rgba(image: &DecodedImage) -> Result<(), EncodeError> {
    if image.width == 0 || image.height == 0 {
        return Err(EncodeError::InvalidDimensions {
            width: image.width,
            height: image.height,
        });
    }
    let expected = (image.width as usize) * (image.height as usize) * 4;
    if image.pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: image.pixels.len(),
        });
    }
    Ok(())
}
