//! Per-request raster processing.
//!
//! Takes the decoded region and the resolved [`ProcessState`] and produces
//! the encoded output:
//!
//! 1. Resolve the encoder from the requested extension. Unknown or
//!    unregistered formats fail here, before any pixel work.
//! 2. Resample the region to the output extent. The filter follows the
//!    actual raster-to-output ratio: magnification uses a bicubic filter,
//!    minification a triangle filter. `image_scale` is only a decoder hint
//!    and is always 1 for a full region.
//! 3. Apply the quality filter (color, gray, bitonal).
//! 4. Mirror and rotate onto a canvas sized by [`rotate`]. Pixels outside
//!    the rotated rectangle stay transparent.
//! 5. Encode, then write the output DPI into the container.
//!
//! Quality runs before rotation so bitonal thresholding never turns the
//! transparent canvas corners opaque.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::color::{QualityFilter, DEFAULT_BITONAL_THRESHOLD, DEFAULT_GRAY_CONTRAST};
use crate::decode::{resample_scale, resample_to_output, DecodedImage};
use crate::encode::{patch_resolution, EncodeOptions, EncoderTable, OutputFormat};
use crate::error::{PipelineError, PipelineResult};
use crate::geometry::ProcessState;
use crate::request::RequestSpec;
use crate::transform::{draw_rotated, rotate, InterpolationFilter};

/// Encoder-facing quality settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityConfig {
    /// Compression quality, 1 to 100.
    pub quality: u8,
    /// Bitonal cut-off on the 0-255 gray scale.
    pub bitonal_threshold: u8,
    /// Contrast factor for gray output, in (0, 1].
    pub gray_contrast: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            quality: 90,
            bitonal_threshold: DEFAULT_BITONAL_THRESHOLD,
            gray_contrast: DEFAULT_GRAY_CONTRAST,
        }
    }
}

/// Raster pipeline bound to an encoder table.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    encoders: EncoderTable,
}

impl Pipeline {
    pub fn new(encoders: EncoderTable) -> Self {
        Self { encoders }
    }

    pub fn encoders(&self) -> &EncoderTable {
        &self.encoders
    }

    /// Fail fast on a format that can't be produced.
    pub fn check_format(&self, spec: &RequestSpec) -> PipelineResult<OutputFormat> {
        let (format, _) = self.encoders.encoder_for(&spec.format)?;
        Ok(format)
    }

    pub fn process(
        &self,
        raster: &DecodedImage,
        state: &ProcessState,
        spec: &RequestSpec,
        quality: &QualityConfig,
    ) -> PipelineResult<Vec<u8>> {
        self.process_cancellable(raster, state, spec, quality, &CancellationToken::new())
    }

    /// Run the pipeline, checking `cancel` between stages.
    #[instrument(skip_all, fields(id = %state.id(), format = %spec.format))]
    pub fn process_cancellable(
        &self,
        raster: &DecodedImage,
        state: &ProcessState,
        spec: &RequestSpec,
        quality: &QualityConfig,
        cancel: &CancellationToken,
    ) -> PipelineResult<Vec<u8>> {
        let checkpoint = || {
            if cancel.is_cancelled() {
                Err(PipelineError::Cancelled {
                    id: state.id().to_string(),
                })
            } else {
                Ok(())
            }
        };

        let (format, encoder) = self.encoders.encoder_for(&spec.format)?;
        checkpoint()?;

        let extent = state.output_extent();
        let scale = resample_scale(raster, extent.width, extent.height);
        let mut image = resample_to_output(raster, extent.width, extent.height)?;
        checkpoint()?;

        QualityFilter::for_quality(spec.quality, quality.bitonal_threshold, quality.gray_contrast)
            .apply(&mut image);

        let plan = rotate(image.width, image.height, spec.rotation.degrees);
        let image = draw_rotated(
            &image,
            &plan,
            spec.rotation.mirror,
            InterpolationFilter::for_scale(scale),
        );
        checkpoint()?;

        let dpi = (state.horizontal_resolution(), state.vertical_resolution());
        let options = EncodeOptions {
            quality: quality.quality.clamp(1, 100),
            dpi,
        };
        let bytes = encoder.encode(&image, &options)?;
        let bytes = patch_resolution(format, bytes, dpi)?;

        debug!(
            width = image.width,
            height = image.height,
            bytes = bytes.len(),
            "Encoded output"
        );
        Ok(bytes)
    }
}

/// Process a decoded region with the built-in encoders.
pub fn process_image(
    raster: &DecodedImage,
    state: &ProcessState,
    spec: &RequestSpec,
    quality: &QualityConfig,
) -> PipelineResult<Vec<u8>> {
    Pipeline::default().process(raster, state, spec, quality)
}
