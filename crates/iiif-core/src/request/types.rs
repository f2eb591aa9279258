//! Core types describing a single image request.

use serde::{Deserialize, Serialize};

/// How the region parameter selects source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegionMode {
    /// The whole source image.
    #[default]
    Full,
    /// Centered square whose side is the shorter source dimension.
    Square,
    /// Absolute pixel rectangle.
    Region,
    /// Rectangle expressed as percentages of the source dimensions.
    PercentageRegion,
}

/// Requested region of the source image.
///
/// `x`, `y`, `width` and `height` are pixels for [`RegionMode::Region`],
/// percentages (0-100) for [`RegionMode::PercentageRegion`] and ignored
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionSpec {
    pub mode: RegionMode,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RegionSpec {
    /// The whole image.
    pub fn full() -> Self {
        Self::default()
    }

    /// Centered square crop.
    pub fn square() -> Self {
        Self {
            mode: RegionMode::Square,
            ..Self::default()
        }
    }

    /// Absolute pixel rectangle.
    pub fn region(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            mode: RegionMode::Region,
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle in percent of the source dimensions.
    pub fn percentage(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            mode: RegionMode::PercentageRegion,
            x,
            y,
            width,
            height,
        }
    }
}

/// How the size parameter scales the selected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeMode {
    /// As large as allowed, never above native size unless upscaling.
    #[default]
    Max,
    /// Best fit inside a `!w,h` box, aspect preserved.
    MaintainAspectRatio,
    /// `pct:n` isotropic scaling.
    PercentageScaled,
    /// Explicit `w,h`, `w,` or `,h`.
    Distort,
    /// Deprecated `full`: region returned unscaled.
    Full,
}

/// Requested output size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeSpec {
    pub mode: SizeMode,
    /// Scale factor as a fraction (`pct:50` is `0.5`).
    pub percent: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Set by the `^` prefix.
    pub upscale_allowed: bool,
}

impl SizeSpec {
    pub fn max() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            mode: SizeMode::Full,
            ..Self::default()
        }
    }

    pub fn percentage(fraction: f64) -> Self {
        Self {
            mode: SizeMode::PercentageScaled,
            percent: Some(fraction),
            ..Self::default()
        }
    }

    pub fn distort(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            mode: SizeMode::Distort,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn best_fit(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            mode: SizeMode::MaintainAspectRatio,
            width,
            height,
            ..Self::default()
        }
    }

    /// Same size, with the `^` upscale marker set.
    pub fn with_upscale(self) -> Self {
        Self {
            upscale_allowed: true,
            ..self
        }
    }
}

/// Clockwise rotation in degrees, optionally mirrored first.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationSpec {
    pub degrees: f64,
    pub mirror: bool,
}

impl RotationSpec {
    pub fn new(degrees: f64, mirror: bool) -> Self {
        Self { degrees, mirror }
    }

    /// Check whether this rotation leaves the image untouched.
    pub fn is_identity(&self) -> bool {
        !self.mirror && (self.degrees % 360.0).abs() < f64::EPSILON
    }
}

/// Rendering intent in the IIIF sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityMode {
    #[default]
    Default,
    Color,
    Gray,
    Bitonal,
}

/// A validated image request.
///
/// Constructed once per request and never modified afterwards; the server
/// ceilings default to unbounded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestSpec {
    pub id: String,
    pub region: RegionSpec,
    pub size: SizeSpec,
    pub rotation: RotationSpec,
    pub quality: QualityMode,
    /// Output extension as requested (`jpg`, `png`, ...). Validated by the
    /// encoder table, not here, so an unknown value can be rejected before
    /// any decode work.
    pub format: String,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_area: Option<u64>,
}

impl RequestSpec {
    /// Create a full/max/0/default request for the given id and format.
    pub fn new(id: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            ..Self::default()
        }
    }

    pub fn with_region(self, region: RegionSpec) -> Self {
        Self { region, ..self }
    }

    pub fn with_size(self, size: SizeSpec) -> Self {
        Self { size, ..self }
    }

    pub fn with_rotation(self, rotation: RotationSpec) -> Self {
        Self { rotation, ..self }
    }

    pub fn with_quality(self, quality: QualityMode) -> Self {
        Self { quality, ..self }
    }

    /// Set the output ceilings. `None` leaves an axis unbounded.
    pub fn with_limits(
        self,
        max_width: Option<u32>,
        max_height: Option<u32>,
        max_area: Option<u64>,
    ) -> Self {
        Self {
            max_width,
            max_height,
            max_area,
            ..self
        }
    }
}
