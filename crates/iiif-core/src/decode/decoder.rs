//! Region decoding on top of the `image` crate.
//!
//! [`RegionDecoder`] is the seam a codec plugs into: it reports source
//! dimensions and produces the pixels of one region, optionally reduced.
//! [`ImageCrateDecoder`] is the bundled implementation. It decodes the whole
//! frame, crops, then applies the reduction hint itself; native DPI comes
//! from the EXIF resolution tags when present.

use std::io::Cursor;

use exif::{In, Reader, Tag, Value};
use image::ImageReader;
use tracing::debug;

use super::resize::resize;
use super::source::ImageSource;
use super::types::{DecodeError, DecodedImage, DecodedRegion, FilterType, SourceInfo};
use crate::geometry::CropRegion;
use crate::transform::apply_crop;

/// Largest head window read when identifying a seekable source.
const MAX_HEAD_WINDOW: u64 = 1 << 20;

/// Decoder collaborator used by the request driver.
pub trait RegionDecoder: Send + Sync {
    /// Dimensions and native resolution of the source.
    fn identify(&self, source: &ImageSource) -> Result<SourceInfo, DecodeError>;

    /// Decode `region`, reduced by `reduction` when it is below 1.
    fn decode(
        &self,
        source: &ImageSource,
        region: CropRegion,
        reduction: f64,
    ) -> Result<DecodedRegion, DecodeError>;
}

/// Decoder for every raster format the `image` crate reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    pub fn new() -> Self {
        Self
    }

    fn read_all(&self, source: &ImageSource) -> Result<Vec<u8>, DecodeError> {
        Ok(source.bytes().read_to_end()?)
    }

    /// Read just enough of a seekable source to parse the header.
    fn dimensions_from_head(&self, source: &ImageSource) -> Option<(u32, u32)> {
        let format = source.format().ok()?;
        let mut window = 16 * 1024;
        loop {
            let head = source.bytes().read_range(0, window).ok()?;
            let exhausted = (head.len() as u64) < window;
            let dims = ImageReader::with_format(Cursor::new(&head), format)
                .into_dimensions()
                .ok();
            if dims.is_some() || exhausted || window >= MAX_HEAD_WINDOW {
                return dims;
            }
            window *= 4;
        }
    }
}

impl RegionDecoder for ImageCrateDecoder {
    fn identify(&self, source: &ImageSource) -> Result<SourceInfo, DecodeError> {
        let format = source.format()?;

        if source.bytes().capabilities().seekable {
            if let Some((width, height)) = self.dimensions_from_head(source) {
                let dpi = source
                    .bytes()
                    .read_range(0, MAX_HEAD_WINDOW)
                    .ok()
                    .and_then(|head| extract_dpi(&head));
                return Ok(SourceInfo { width, height, dpi });
            }
        }

        let bytes = self.read_all(source)?;
        let (width, height) = ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

        Ok(SourceInfo {
            width,
            height,
            dpi: extract_dpi(&bytes),
        })
    }

    fn decode(
        &self,
        source: &ImageSource,
        region: CropRegion,
        reduction: f64,
    ) -> Result<DecodedRegion, DecodeError> {
        let format = source.format()?;
        let bytes = self.read_all(source)?;

        let img = ImageReader::with_format(Cursor::new(&bytes), format)
            .decode()
            .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;
        let (native_width, native_height) = (img.width(), img.height());

        let full = DecodedImage::from_rgba_image(img.into_rgba8());
        let cropped = apply_crop(&full, region);

        let image = if reduction < 1.0 {
            let width = ((cropped.width as f64 * reduction).round() as u32).max(1);
            let height = ((cropped.height as f64 * reduction).round() as u32).max(1);
            resize(&cropped, width, height, FilterType::Bilinear)?
        } else {
            cropped
        };

        debug!(
            id = %source.id(),
            ?region,
            reduction,
            decoded_width = image.width,
            decoded_height = image.height,
            "Decoded source region"
        );

        Ok(DecodedRegion {
            image,
            native_width,
            native_height,
        })
    }
}

/// Extract (horizontal, vertical) DPI from EXIF resolution tags.
///
/// Returns `None` if no EXIF data is found or the tags are unusable.
pub fn extract_dpi(bytes: &[u8]) -> Option<(u16, u16)> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    let rational = |tag: Tag| -> Option<f64> {
        match &exif.get_field(tag, In::PRIMARY)?.value {
            Value::Rational(values) => values.first().map(|r| r.to_f64()),
            _ => None,
        }
    };

    // 2 = inches, 3 = centimeters; a missing unit means inches.
    let per_inch = match exif
        .get_field(Tag::ResolutionUnit, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
    {
        Some(3) => 2.54,
        Some(1) => return None,
        _ => 1.0,
    };

    let to_dpi = |v: f64| -> Option<u16> {
        let dpi = (v * per_inch).round();
        (dpi.is_finite() && dpi >= 1.0 && dpi <= u16::MAX as f64).then_some(dpi as u16)
    };

    let x = to_dpi(rational(Tag::XResolution)?)?;
    let y = rational(Tag::YResolution).and_then(to_dpi).unwrap_or(x);
    Some((x, y))
}
