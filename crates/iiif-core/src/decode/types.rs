//! Core types for image decoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for image decoding operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The source bytes are not an image format this decoder understands.
    #[error("Source {id} is not decodable: {reason}")]
    NotDecodable { id: String, reason: String },

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),

    /// I/O error while reading the source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source can't serve the access pattern the decoder needs.
    #[error("Byte source does not support {0}")]
    Unsupported(&'static str),
}

/// Filter type for image resizing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterType {
    /// Bilinear (triangle) interpolation. The kernel widens with the
    /// reduction ratio, so it averages like a mip level when minifying.
    #[default]
    Bilinear,
    /// Catmull-Rom bicubic, used for magnification.
    Bicubic,
}

impl FilterType {
    /// Convert to the image crate's FilterType.
    pub fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            FilterType::Bilinear => image::imageops::FilterType::Triangle,
            FilterType::Bicubic => image::imageops::FilterType::CatmullRom,
        }
    }

    /// Magnification and minification use different resamplers. `scale` is
    /// output size over raster size.
    pub fn for_scale(scale: f64) -> Self {
        if scale > 1.0 {
            FilterType::Bicubic
        } else {
            FilterType::Bilinear
        }
    }
}

/// Dimensions and resolution of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Native (horizontal, vertical) DPI when the file records one.
    pub dpi: Option<(u16, u16)>,
}

/// A decoded image with RGBA pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGBA pixel data in row-major order (4 bytes per pixel).
    /// Length should be width * height * 4.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Create a new DecodedImage with the given dimensions and pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            (width as usize) * (height as usize) * 4,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Fully transparent canvas.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; (width as usize) * (height as usize) * 4],
        }
    }

    /// Create a DecodedImage from an image::RgbaImage.
    pub fn from_rgba_image(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    /// Convert to an image::RgbaImage for further processing.
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    /// RGB bytes with alpha dropped, for encoders without an alpha channel.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }
}

/// Output of a region decode.
#[derive(Debug, Clone)]
pub struct DecodedRegion {
    /// The requested region, possibly reduced.
    pub image: DecodedImage,
    /// Full source dimensions.
    pub native_width: u32,
    pub native_height: u32,
}
