//! Resampling of decoded regions to their output extent.
//!
//! Uses the `image` crate's separable convolution filters. The filter is
//! picked from the ratio between the decoded raster and the output extent:
//! magnification gets a bicubic kernel, minification a triangle kernel whose
//! support widens with the ratio.

use super::{DecodeError, DecodedImage, FilterType};

/// Resize an image to exact dimensions.
///
/// # Errors
///
/// Returns `DecodeError::CorruptedFile` if a target dimension is zero or the
/// pixel buffer does not match the image dimensions.
pub fn resize(
    image: &DecodedImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<DecodedImage, DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::CorruptedFile(format!(
            "cannot resize to {width}x{height}"
        )));
    }

    if image.width == width && image.height == height {
        return Ok(image.clone());
    }

    let rgba_image = image.to_rgba_image().ok_or_else(|| {
        DecodeError::CorruptedFile("pixel buffer does not match dimensions".to_string())
    })?;

    let resized = image::imageops::resize(&rgba_image, width, height, filter.to_image_filter());

    Ok(DecodedImage::from_rgba_image(resized))
}

/// Smaller of the two axis ratios from `image` to a `width` x `height`
/// output. An empty raster counts as 1.
pub fn resample_scale(image: &DecodedImage, width: u32, height: u32) -> f64 {
    if image.width == 0 || image.height == 0 {
        return 1.0;
    }
    (width as f64 / image.width as f64).min(height as f64 / image.height as f64)
}

/// Resample a decoded region to the output extent, choosing the filter from
/// the raster-to-output ratio.
pub fn resample_to_output(
    image: &DecodedImage,
    width: u32,
    height: u32,
) -> Result<DecodedImage, DecodeError> {
    let filter = FilterType::for_scale(resample_scale(image, width, height));
    resize(image, width, height, filter)
}
