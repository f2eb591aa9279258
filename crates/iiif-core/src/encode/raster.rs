//! Raster encoders backed by the `image` crate.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::codecs::png::PngEncoder as ImagePngEncoder;
use image::codecs::tiff::TiffEncoder as ImageTiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{validate_rgba, EncodeError, EncodeOptions, FormatEncoder, OutputFormat};
use crate::decode::DecodedImage;

/// Encode RGB pixel data to JPEG bytes.
///
/// # Arguments
///
/// * `pixels` - RGB pixel data (3 bytes per pixel, row-major order)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `quality` - JPEG quality, clamped to 1-100
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let expected_len = (width as usize) * (height as usize) * 3;
    if pixels.len() != expected_len {
        return Err(EncodeError::InvalidPixelData {
            expected: expected_len,
            actual: pixels.len(),
        });
    }

    let quality = quality.clamp(1, 100);
    let mut buffer = Cursor::new(Vec::new());
    ImageJpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::failed(OutputFormat::Jpg, e))?;

    Ok(buffer.into_inner())
}

/// Baseline JPEG. Alpha is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegEncoder;

impl FormatEncoder for JpegEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpg
    }

    fn encode(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        validate_rgba(image)?;
        encode_jpeg(&image.to_rgb_bytes(), image.width, image.height, options.quality)
    }
}

/// 8-bit RGBA PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl FormatEncoder for PngEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn encode(&self, image: &DecodedImage, _options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        validate_rgba(image)?;
        let mut out = Vec::new();
        ImagePngEncoder::new(&mut out)
            .write_image(&image.pixels, image.width, image.height, ExtendedColorType::Rgba8)
            .map_err(|e| EncodeError::failed(OutputFormat::Png, e))?;
        Ok(out)
    }
}

/// Lossless WebP. The `image` crate has no lossy WebP encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpEncoder;

impl FormatEncoder for WebpEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Webp
    }

    fn encode(&self, image: &DecodedImage, _options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        validate_rgba(image)?;
        let mut out = Vec::new();
        WebPEncoder::new_lossless(&mut out)
            .write_image(&image.pixels, image.width, image.height, ExtendedColorType::Rgba8)
            .map_err(|e| EncodeError::failed(OutputFormat::Webp, e))?;
        Ok(out)
    }
}

/// Uncompressed RGBA TIFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffEncoder;

impl FormatEncoder for TiffEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Tif
    }

    fn encode(&self, image: &DecodedImage, _options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        validate_rgba(image)?;
        let mut buffer = Cursor::new(Vec::new());
        ImageTiffEncoder::new(&mut buffer)
            .write_image(&image.pixels, image.width, image.height, ExtendedColorType::Rgba8)
            .map_err(|e| EncodeError::failed(OutputFormat::Tif, e))?;
        Ok(buffer.into_inner())
    }
}
