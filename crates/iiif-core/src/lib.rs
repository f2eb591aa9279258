//! IIIF Core - Image API request processing
//!
//! This crate turns an IIIF Image API request into encoded output bytes:
//! region/size geometry resolution, rotation bounding boxes, quality
//! filters, format dispatch with resolution metadata, and an async request
//! driver over a pluggable decoder.
//!
//! Data flow:
//!
//! ```text
//! RequestSpec + source dims -> resolve -> ProcessState
//!     -> RegionDecoder::decode -> DecodedImage
//!     -> Pipeline (resample, quality, rotate, encode) -> bytes
//! ```

pub mod color;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod request;
pub mod service;
pub mod transform;

pub use config::{load_config, ImageServerConfig};
pub use decode::{DecodedImage, ImageCrateDecoder, ImageSource, RegionDecoder};
pub use encode::{EncoderTable, OutputFormat};
pub use error::{PipelineError, PipelineResult};
pub use geometry::{resolve, ProcessState};
pub use pipeline::{process_image, Pipeline, QualityConfig};
pub use request::{QualityMode, RegionSpec, RequestSpec, RotationSpec, SizeSpec};
pub use service::{ImageService, RenderedImage};
pub use transform::{rotate, RotationPlan};

/// Resolve request geometry for a source of the given size.
///
/// Alias of [`geometry::resolve`] under the name used by the outer
/// controller layer.
pub fn resolve_geometry(
    spec: &RequestSpec,
    source_width: u32,
    source_height: u32,
    allow_upscale: bool,
) -> Result<ProcessState, geometry::GeometryError> {
    resolve(spec, source_width, source_height, allow_upscale)
}
