//! Pixel-space cropping of decoded rasters.

use crate::decode::DecodedImage;
use crate::geometry::CropRegion;

/// Copy a rectangle out of an image.
///
/// The region is clamped to the image bounds; the result is never smaller
/// than 1x1. A region covering the whole image returns a copy.
pub fn apply_crop(image: &DecodedImage, region: CropRegion) -> DecodedImage {
    if region.x == 0
        && region.y == 0
        && region.width >= image.width
        && region.height >= image.height
    {
        return image.clone();
    }

    let left = region.x.min(image.width.saturating_sub(1));
    let top = region.y.min(image.height.saturating_sub(1));
    let right = left.saturating_add(region.width).min(image.width);
    let bottom = top.saturating_add(region.height).min(image.height);

    let out_width = right.saturating_sub(left).max(1);
    let out_height = bottom.saturating_sub(top).max(1);

    let row_bytes = (out_width * 4) as usize;
    let mut output = Vec::with_capacity(row_bytes * out_height as usize);

    // Copy pixel data row by row
    for y in 0..out_height {
        let start = (((top + y) * image.width + left) * 4) as usize;
        output.extend_from_slice(&image.pixels[start..start + row_bytes]);
    }

    DecodedImage::new(out_width, out_height, output)
}
