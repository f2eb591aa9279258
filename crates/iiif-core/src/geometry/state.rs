//! Resolved pixel geometry for one request.

use serde::Serialize;
use thiserror::Error;

/// Resolution reported until the source's native DPI is known.
pub const DEFAULT_DPI: u16 = 72;

/// Geometry that cannot be satisfied. Always a client error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Invalid geometry: region origin ({x}, {y}) is negative or not a number")]
    NegativeOrigin { x: f64, y: f64 },

    #[error("Invalid geometry: region is empty ({width}x{height})")]
    EmptyRegion { width: f64, height: f64 },

    #[error("Invalid geometry: source image is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
}

/// Pixel rectangle in source image space, handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

/// Resolved geometry of a request.
///
/// Produced once by [`resolve`](super::resolve) and only read afterwards.
/// Fields are private so a state can't be half-built or patched in place;
/// [`with_source_resolution`](Self::with_source_resolution) returns a new
/// value instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessState {
    pub(super) id: String,
    pub(super) start_x: u32,
    pub(super) start_y: u32,
    pub(super) region_width: u32,
    pub(super) region_height: u32,
    pub(super) output_width: u32,
    pub(super) output_height: u32,
    pub(super) output_scale: f64,
    pub(super) image_scale: f64,
    pub(super) horizontal_resolution: u16,
    pub(super) vertical_resolution: u16,
    pub(super) tile: Option<Extent>,
}

impl ProcessState {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Crop origin X in source pixels.
    pub fn start_x(&self) -> u32 {
        self.start_x
    }

    /// Crop origin Y in source pixels.
    pub fn start_y(&self) -> u32 {
        self.start_y
    }

    pub fn region_width(&self) -> u32 {
        self.region_width
    }

    pub fn region_height(&self) -> u32 {
        self.region_height
    }

    /// Final canvas width before rotation.
    pub fn output_width(&self) -> u32 {
        self.output_width
    }

    /// Final canvas height before rotation.
    pub fn output_height(&self) -> u32 {
        self.output_height
    }

    /// Output/region ratio after ceilings and the upscale gate.
    pub fn output_scale(&self) -> f64 {
        self.output_scale
    }

    /// Reduction hint for decoders that can skip source pixels.
    pub fn image_scale(&self) -> f64 {
        self.image_scale
    }

    pub fn horizontal_resolution(&self) -> u16 {
        self.horizontal_resolution
    }

    pub fn vertical_resolution(&self) -> u16 {
        self.vertical_resolution
    }

    /// Native tile extent, reported for full-region max-size requests.
    pub fn tile(&self) -> Option<Extent> {
        self.tile
    }

    pub fn output_extent(&self) -> Extent {
        Extent {
            width: self.output_width,
            height: self.output_height,
        }
    }

    /// The source rectangle the decoder must produce.
    pub fn crop_region(&self) -> CropRegion {
        CropRegion {
            x: self.start_x,
            y: self.start_y,
            width: self.region_width,
            height: self.region_height,
        }
    }

    /// Derive the output resolution from the source's native DPI.
    ///
    /// The physical size of the region is kept, so the DPI shrinks with the
    /// output scale. Zero inputs fall back to [`DEFAULT_DPI`].
    pub fn with_source_resolution(&self, horizontal: u16, vertical: u16) -> ProcessState {
        ProcessState {
            horizontal_resolution: scale_dpi(horizontal, self.output_scale),
            vertical_resolution: scale_dpi(vertical, self.output_scale),
            ..self.clone()
        }
    }
}

fn scale_dpi(native: u16, scale: f64) -> u16 {
    let native = if native == 0 { DEFAULT_DPI } else { native };
    (native as f64 * scale)
        .round()
        .clamp(1.0, u16::MAX as f64) as u16
}
