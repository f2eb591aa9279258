//! Region and size resolution.
//!
//! # Algorithm
//!
//! 1. The region resolves to an integer rectangle in source space and is
//!    rejected if empty or if its origin is negative.
//! 2. The size resolves to a floating-point target box for that rectangle.
//! 3. The target is shrunk, keeping its own aspect, until no axis scale
//!    exceeds the server ceiling `min(maxWidth/srcW, maxHeight/srcH)`.
//! 4. Without upscale permission it is shrunk again until no axis scale
//!    exceeds 1.
//! 5. Extents are rounded half away from zero.
//!
//! Shrinking by the largest axis scale keeps distorted `w,h` requests inside
//! both ceilings; for isotropic modes it is the plain `min` clamp on the
//! scale factor.

use tracing::debug;

use super::state::{Extent, GeometryError, ProcessState, DEFAULT_DPI};
use crate::request::{RegionMode, RegionSpec, RequestSpec, SizeMode, SizeSpec};

/// Integer source rectangle, kept as floats for the size arithmetic.
#[derive(Debug, Clone, Copy)]
struct SourceRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Floating-point output box before rounding.
#[derive(Debug, Clone, Copy)]
struct Target {
    width: f64,
    height: f64,
}

impl Target {
    fn isotropic(rect: &SourceRect, scale: f64) -> Self {
        Self {
            width: rect.width * scale,
            height: rect.height * scale,
        }
    }

    /// Largest per-axis scale relative to the region.
    fn max_axis_scale(&self, rect: &SourceRect) -> f64 {
        (self.width / rect.width).max(self.height / rect.height)
    }

    /// Smallest per-axis scale relative to the region.
    fn min_axis_scale(&self, rect: &SourceRect) -> f64 {
        (self.width / rect.width).min(self.height / rect.height)
    }

    /// Shrink so that no axis scale exceeds `limit`.
    fn clamp_scale(self, rect: &SourceRect, limit: f64) -> Self {
        let largest = self.max_axis_scale(rect);
        if largest <= limit {
            return self;
        }
        let ratio = limit / largest;
        Self {
            width: self.width * ratio,
            height: self.height * ratio,
        }
    }
}

/// Resolve a request against a source of the given size.
///
/// `allow_upscale` is the server permission; upscaling happens only when it
/// is set and the size carries the `^` marker.
///
/// # Errors
///
/// Returns [`GeometryError`] when the region is empty after clipping to the
/// source, when its origin is negative, or when the source itself is empty.
pub fn resolve(
    spec: &RequestSpec,
    source_width: u32,
    source_height: u32,
    allow_upscale: bool,
) -> Result<ProcessState, GeometryError> {
    if source_width == 0 || source_height == 0 {
        return Err(GeometryError::EmptySource {
            width: source_width,
            height: source_height,
        });
    }

    let rect = resolve_region(&spec.region, source_width, source_height)?;
    let upscale = allow_upscale && spec.size.upscale_allowed;
    let ceiling = ceiling_scale(spec, source_width, source_height);

    let target = resolve_size(&spec.size, &rect, upscale, ceiling);
    let target = match ceiling {
        Some(limit) => target.clamp_scale(&rect, limit),
        None => target,
    };
    let target = if upscale {
        target
    } else {
        target.clamp_scale(&rect, 1.0)
    };

    let output_width = round_px(target.width);
    let output_height = round_px(target.height);
    let output_scale = target.min_axis_scale(&rect);

    let image_scale = if spec.region.mode == RegionMode::Full {
        1.0
    } else {
        (output_width as f64 / rect.width).min(output_height as f64 / rect.height)
    };

    let tile = (spec.region.mode == RegionMode::Full && spec.size.mode == SizeMode::Max).then_some(
        Extent {
            width: output_width,
            height: output_height,
        },
    );

    let state = ProcessState {
        id: spec.id.clone(),
        start_x: rect.x as u32,
        start_y: rect.y as u32,
        region_width: rect.width as u32,
        region_height: rect.height as u32,
        output_width,
        output_height,
        output_scale,
        image_scale,
        horizontal_resolution: DEFAULT_DPI,
        vertical_resolution: DEFAULT_DPI,
        tile,
    };

    debug!(
        id = %state.id,
        region = ?state.crop_region(),
        output = ?state.output_extent(),
        output_scale = state.output_scale,
        image_scale = state.image_scale,
        "Resolved request geometry"
    );

    Ok(state)
}

/// Step 1: absolute source rectangle.
fn resolve_region(
    region: &RegionSpec,
    source_width: u32,
    source_height: u32,
) -> Result<SourceRect, GeometryError> {
    let (src_w, src_h) = (source_width as f64, source_height as f64);

    let (x, y, width, height) = match region.mode {
        RegionMode::Full => (0.0, 0.0, src_w, src_h),
        RegionMode::Square => {
            let side = source_width.min(source_height);
            (
                ((source_width - side) / 2) as f64,
                ((source_height - side) / 2) as f64,
                side as f64,
                side as f64,
            )
        }
        RegionMode::Region => (
            region.x.trunc(),
            region.y.trunc(),
            region.width.trunc(),
            region.height.trunc(),
        ),
        RegionMode::PercentageRegion => (
            (region.x / 100.0 * src_w).round(),
            (region.y / 100.0 * src_h).round(),
            (region.width / 100.0 * src_w).round(),
            (region.height / 100.0 * src_h).round(),
        ),
    };

    // NaN fails both comparisons, so test for the accepted range instead.
    if !(x >= 0.0 && y >= 0.0) {
        return Err(GeometryError::NegativeOrigin { x, y });
    }

    // Regions running past the image edge are cut at the edge.
    let width = width.min(src_w - x);
    let height = height.min(src_h - y);
    if !(width >= 1.0 && height >= 1.0) {
        return Err(GeometryError::EmptyRegion {
            width: width.max(0.0),
            height: height.max(0.0),
        });
    }

    Ok(SourceRect {
        x,
        y,
        width,
        height,
    })
}

/// Step 2: requested output box for the region.
fn resolve_size(size: &SizeSpec, rect: &SourceRect, upscale: bool, ceiling: Option<f64>) -> Target {
    match size.mode {
        SizeMode::Full => Target::isotropic(rect, 1.0),
        SizeMode::Max => max_target(size, rect, upscale, ceiling),
        SizeMode::PercentageScaled => {
            let percent = size.percent.unwrap_or(1.0);
            // Clamped before anything else touches it.
            let percent = if upscale { percent } else { percent.min(1.0) };
            Target::isotropic(rect, percent)
        }
        SizeMode::Distort => match (size.width, size.height) {
            (Some(width), Some(height)) => Target {
                width: width as f64,
                height: height as f64,
            },
            (None, None) => max_target(size, rect, upscale, ceiling),
            (width, height) => fit_target(rect, width, height),
        },
        SizeMode::MaintainAspectRatio => match (size.width, size.height) {
            (None, None) => max_target(size, rect, upscale, ceiling),
            (width, height) => fit_target(rect, width, height),
        },
    }
}

/// `max`: native size, a percentage of it, or as large as the ceiling allows.
fn max_target(size: &SizeSpec, rect: &SourceRect, upscale: bool, ceiling: Option<f64>) -> Target {
    let scale = match size.percent {
        Some(percent) => percent,
        None if upscale => ceiling.unwrap_or(1.0),
        None => 1.0,
    };
    let scale = if upscale { scale } else { scale.min(1.0) };
    Target::isotropic(rect, scale)
}

/// Tightest isotropic fit inside the given box; a missing side is unbounded.
fn fit_target(rect: &SourceRect, width: Option<u32>, height: Option<u32>) -> Target {
    let w_scale = width.map(|w| w as f64 / rect.width);
    let h_scale = height.map(|h| h as f64 / rect.height);
    let scale = match (w_scale, h_scale) {
        (Some(w), Some(h)) => w.min(h),
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (None, None) => 1.0,
    };
    Target::isotropic(rect, scale)
}

/// Step 3 ceiling: `min(maxWidth/srcW, maxHeight/srcH)`, `None` if unbounded.
///
/// `max_area` is carried on the request but not applied here.
fn ceiling_scale(spec: &RequestSpec, source_width: u32, source_height: u32) -> Option<f64> {
    let w = spec
        .max_width
        .map(|max| max as f64 / source_width as f64);
    let h = spec
        .max_height
        .map(|max| max as f64 / source_height as f64);
    match (w, h) {
        (Some(w), Some(h)) => Some(w.min(h)),
        (one, other) => one.or(other),
    }
}

/// Round half away from zero, never below one pixel.
fn round_px(value: f64) -> u32 {
    value.round().clamp(1.0, u32::MAX as f64) as u32
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dimensions_strategy() -> impl Strategy<Value = (u32, u32)> {
        (1u32..=5000, 1u32..=5000)
    }

    fn size_strategy() -> impl Strategy<Value = SizeSpec> {
        prop_oneof![
            Just(SizeSpec::max()),
            Just(SizeSpec::full()),
            (0.01f64..4.0).prop_map(SizeSpec::percentage),
            (1u32..3000, 1u32..3000).prop_map(|(w, h)| SizeSpec::distort(Some(w), Some(h))),
            (1u32..3000).prop_map(|w| SizeSpec::distort(Some(w), None)),
            (1u32..3000).prop_map(|h| SizeSpec::best_fit(None, Some(h))),
            (1u32..3000, 1u32..3000).prop_map(|(w, h)| SizeSpec::best_fit(Some(w), Some(h))),
        ]
        .prop_flat_map(|size| any::<bool>().prop_map(move |up| if up { size.with_upscale() } else { size }))
    }

    fn region_strategy() -> impl Strategy<Value = RegionSpec> {
        prop_oneof![
            Just(RegionSpec::full()),
            Just(RegionSpec::square()),
            (0.0f64..4000.0, 0.0f64..4000.0, 1.0f64..4000.0, 1.0f64..4000.0)
                .prop_map(|(x, y, w, h)| RegionSpec::region(x, y, w, h)),
            (0.0f64..90.0, 0.0f64..90.0, 10.0f64..100.0, 10.0f64..100.0)
                .prop_map(|(x, y, w, h)| RegionSpec::percentage(x, y, w, h)),
        ]
    }

    proptest! {
        /// Property: Full region with max size covers the whole image.
        #[test]
        fn prop_full_max_covers_source((w, h) in dimensions_strategy()) {
            let spec = RequestSpec::new("p", "jpg");
            let state = resolve(&spec, w, h, false).unwrap();
            prop_assert_eq!((state.start_x(), state.start_y()), (0, 0));
            prop_assert_eq!((state.region_width(), state.region_height()), (w, h));
        }

        /// Property: Same inputs always produce the same state.
        #[test]
        fn prop_resolve_is_deterministic(
            (w, h) in dimensions_strategy(),
            region in region_strategy(),
            size in size_strategy(),
            allow in any::<bool>(),
        ) {
            let spec = RequestSpec::new("p", "jpg").with_region(region).with_size(size);
            let first = resolve(&spec, w, h, allow);
            let second = resolve(&spec, w, h, allow);
            prop_assert_eq!(first, second);
        }

        /// Property: Without upscale permission the output never exceeds the region.
        #[test]
        fn prop_no_upscale_without_permission(
            (w, h) in dimensions_strategy(),
            region in region_strategy(),
            size in size_strategy(),
        ) {
            let spec = RequestSpec::new("p", "jpg").with_region(region).with_size(size);
            if let Ok(state) = resolve(&spec, w, h, false) {
                prop_assert!(state.output_scale() <= 1.0 + 1e-12);
                prop_assert!(state.output_width() <= state.region_width());
                prop_assert!(state.output_height() <= state.region_height());
            }
        }

        /// Property: Resolved regions are non-empty and lie inside the source.
        #[test]
        fn prop_region_inside_source(
            (w, h) in dimensions_strategy(),
            region in region_strategy(),
            size in size_strategy(),
            allow in any::<bool>(),
        ) {
            let spec = RequestSpec::new("p", "jpg").with_region(region).with_size(size);
            if let Ok(state) = resolve(&spec, w, h, allow) {
                prop_assert!(state.region_width() > 0 && state.region_height() > 0);
                prop_assert!(state.start_x() + state.region_width() <= w);
                prop_assert!(state.start_y() + state.region_height() <= h);
                prop_assert!(state.output_width() > 0 && state.output_height() > 0);
            }
        }

        /// Property: Output respects the configured ceilings.
        #[test]
        fn prop_output_within_ceiling(
            (w, h) in dimensions_strategy(),
            region in region_strategy(),
            size in size_strategy(),
            (max_w, max_h) in (1u32..2000, 1u32..2000),
            allow in any::<bool>(),
        ) {
            let spec = RequestSpec::new("p", "jpg")
                .with_region(region)
                .with_size(size)
                .with_limits(Some(max_w), Some(max_h), None);
            if let Ok(state) = resolve(&spec, w, h, allow) {
                prop_assert!(state.output_width() <= max_w.max(1));
                prop_assert!(state.output_height() <= max_h.max(1));
            }
        }

        /// Property: Best fit preserves the region's aspect ratio within rounding.
        #[test]
        fn prop_best_fit_preserves_aspect(
            (w, h) in (10u32..3000, 10u32..3000),
            (bw, bh) in (10u32..3000, 10u32..3000),
        ) {
            let spec = RequestSpec::new("p", "jpg").with_size(SizeSpec::best_fit(Some(bw), Some(bh)));
            let state = resolve(&spec, w, h, false).unwrap();
            prop_assert!(state.output_width() <= bw && state.output_height() <= bh);
            let expected_h = state.output_width() as f64 * h as f64 / w as f64;
            prop_assert!((state.output_height() as f64 - expected_h).abs() <= 1.0 + h as f64 / w as f64);
        }
    }
}
