//! Rotation bounding boxes and rotated canvas drawing.
//!
//! IIIF rotations are clockwise. With the y axis pointing down, a point of
//! the source maps onto the canvas as:
//!
//! ```text
//! canvas_x = origin_x + x * cos(θ) - y * sin(θ)
//! canvas_y = origin_y + x * sin(θ) + y * cos(θ)
//! ```
//!
//! [`rotate`] picks the canvas size and the origin so the rotated rectangle
//! fits exactly. [`draw_rotated`] fills that canvas by inverse mapping: for
//! each canvas pixel we find the source position and interpolate there.
//! Canvas pixels whose source position falls outside the image stay
//! transparent, which clips the draw to the rotated rectangle.
//!
//! Mirroring flips the source horizontally before it is rotated.

use serde::Serialize;

use crate::decode::DecodedImage;

/// Interpolation filter for rotation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationFilter {
    /// Bilinear interpolation - used when the output is reduced.
    #[default]
    Bilinear,
    /// Lanczos3 interpolation - used when the output is magnified.
    Lanczos3,
}

impl InterpolationFilter {
    /// Pick the sampler for an output-over-raster scale factor.
    pub fn for_scale(scale: f64) -> Self {
        if scale > 1.0 {
            InterpolationFilter::Lanczos3
        } else {
            InterpolationFilter::Bilinear
        }
    }
}

/// Canvas size and placement for a rotated rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RotationPlan {
    /// Rotation normalized to (-180, 180].
    pub angle: f64,
    /// Canvas position of the source's top-left corner.
    pub origin_x: f64,
    pub origin_y: f64,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl RotationPlan {
    pub fn is_identity(&self) -> bool {
        self.angle == 0.0
    }
}

/// Normalize an angle in degrees to (-180, 180].
pub fn normalize_angle(degrees: f64) -> f64 {
    let angle = degrees % 360.0;
    if angle > 180.0 {
        angle - 360.0
    } else if angle <= -180.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Sine and cosine, exact at multiples of 90 degrees.
fn sin_cos(angle: f64) -> (f64, f64) {
    if angle % 90.0 == 0.0 {
        match angle as i32 {
            90 => (1.0, 0.0),
            180 => (0.0, -1.0),
            -90 => (-1.0, 0.0),
            _ => (0.0, 1.0),
        }
    } else {
        angle.to_radians().sin_cos()
    }
}

/// Compute the canvas that holds a `width` x `height` rectangle rotated
/// clockwise by `degrees`, and where the rectangle's origin lands on it.
///
/// 0 and 360 degrees are the identity: the canvas is the rectangle itself
/// and the origin is (0, 0).
///
/// # Example
///
/// ```ignore
/// use iiif_core::transform::rotate;
///
/// let plan = rotate(300, 200, 90.0);
/// assert_eq!((plan.canvas_width, plan.canvas_height), (200, 300));
/// assert_eq!((plan.origin_x, plan.origin_y), (200.0, 0.0));
/// ```
pub fn rotate(width: u32, height: u32, degrees: f64) -> RotationPlan {
    let angle = normalize_angle(degrees);
    if angle == 0.0 {
        return RotationPlan {
            angle: 0.0,
            origin_x: 0.0,
            origin_y: 0.0,
            canvas_width: width,
            canvas_height: height,
        };
    }

    let (sin, cos) = sin_cos(angle);
    let (w, h) = (width as f64, height as f64);

    let canvas_w = sin.abs() * h + cos.abs() * w;
    let canvas_h = sin.abs() * w + cos.abs() * h;

    // Each quadrant brings a different corner to the top-left of the canvas.
    let (origin_x, origin_y) = if angle > 0.0 && angle <= 90.0 {
        (h * sin, 0.0)
    } else if angle > 90.0 {
        (canvas_w, -h * cos)
    } else if angle >= -90.0 {
        (0.0, -w * sin)
    } else {
        (-w * cos, canvas_h)
    };

    RotationPlan {
        angle,
        origin_x,
        origin_y,
        canvas_width: canvas_extent(canvas_w),
        canvas_height: canvas_extent(canvas_h),
    }
}

/// Whole pixels covering a rotated extent. Rounds up so the far corners stay
/// on the canvas; the tolerance absorbs trig noise on exact extents.
fn canvas_extent(extent: f64) -> u32 {
    ((extent - 1e-6).ceil() as u32).max(1)
}

/// Draw `image` mirrored (optionally) and rotated onto a fresh canvas.
///
/// The canvas has the size computed by [`rotate`]; uncovered pixels are
/// fully transparent.
pub fn draw_rotated(
    image: &DecodedImage,
    plan: &RotationPlan,
    mirror: bool,
    filter: InterpolationFilter,
) -> DecodedImage {
    if plan.is_identity() && !mirror {
        return image.clone();
    }

    let (sin, cos) = sin_cos(plan.angle);
    let (src_w, src_h) = (image.width as f64, image.height as f64);
    let (dst_w, dst_h) = (plan.canvas_width, plan.canvas_height);

    let mut output = DecodedImage::blank(dst_w, dst_h);

    for dst_y in 0..dst_h {
        for dst_x in 0..dst_w {
            // Pixel centers, relative to the rotated origin
            let qx = dst_x as f64 + 0.5 - plan.origin_x;
            let qy = dst_y as f64 + 0.5 - plan.origin_y;

            // Inverse rotation back into (mirrored) source space
            let mut src_x = qx * cos + qy * sin;
            let src_y = -qx * sin + qy * cos;
            if mirror {
                src_x = src_w - src_x;
            }

            if !(0.0..src_w).contains(&src_x) || !(0.0..src_h).contains(&src_y) {
                continue;
            }

            let pixel = match filter {
                InterpolationFilter::Bilinear => sample_bilinear(image, src_x - 0.5, src_y - 0.5),
                InterpolationFilter::Lanczos3 => sample_lanczos3(image, src_x - 0.5, src_y - 0.5),
            };

            let dst_idx = ((dst_y * dst_w + dst_x) * 4) as usize;
            output.pixels[dst_idx..dst_idx + 4].copy_from_slice(&pixel);
        }
    }

    output
}

/// Get a pixel as [f64; 4] from an image at the given coordinates.
#[inline]
fn get_pixel_f64(image: &DecodedImage, px: usize, py: usize) -> [f64; 4] {
    let idx = (py * image.width as usize + px) * 4;
    [
        image.pixels[idx] as f64,
        image.pixels[idx + 1] as f64,
        image.pixels[idx + 2] as f64,
        image.pixels[idx + 3] as f64,
    ]
}

/// Sample a pixel using bilinear interpolation.
///
/// Coordinates are pixel-center based and clamped to the image, so edge
/// pixels repeat rather than fading to black.
fn sample_bilinear(image: &DecodedImage, x: f64, y: f64) -> [u8; 4] {
    let max_x = (image.width - 1) as f64;
    let max_y = (image.height - 1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(image.width as usize - 1);
    let y1 = (y0 + 1).min(image.height as usize - 1);

    // Fractional distances
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = get_pixel_f64(image, x0, y0);
    let p10 = get_pixel_f64(image, x1, y0);
    let p01 = get_pixel_f64(image, x0, y1);
    let p11 = get_pixel_f64(image, x1, y1);

    let mut result = [0u8; 4];
    for i in 0..4 {
        let v = p00[i] * (1.0 - fx) * (1.0 - fy)
            + p10[i] * fx * (1.0 - fy)
            + p01[i] * (1.0 - fx) * fy
            + p11[i] * fx * fy;
        result[i] = v.clamp(0.0, 255.0).round() as u8;
    }

    result
}

/// Sample a pixel using Lanczos3 interpolation.
///
/// Lanczos3 considers a 6x6 neighborhood of pixels, providing
/// higher quality results especially for sharp edges.
fn sample_lanczos3(image: &DecodedImage, x: f64, y: f64) -> [u8; 4] {
    let (w, h) = (image.width as i64, image.height as i64);

    // Fall back to bilinear where the kernel would leave the image
    if x < 2.0 || x >= (w - 3) as f64 || y < 2.0 || y >= (h - 3) as f64 {
        return sample_bilinear(image, x, y);
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;

    let mut sum = [0.0f64; 4];
    let mut weight_sum = 0.0;

    for ky in -2..=3 {
        for kx in -2..=3 {
            let px = x0 + kx;
            let py = y0 + ky;

            let weight = lanczos_weight(x - px as f64, 3.0) * lanczos_weight(y - py as f64, 3.0);
            let pixel = get_pixel_f64(image, px as usize, py as usize);
            for i in 0..4 {
                sum[i] += pixel[i] * weight;
            }
            weight_sum += weight;
        }
    }

    let mut result = [0u8; 4];
    if weight_sum > 0.0 {
        for i in 0..4 {
            result[i] = (sum[i] / weight_sum).clamp(0.0, 255.0).round() as u8;
        }
    }

    result
}

/// Lanczos kernel weight function.
///
/// ```text
/// L(x) = sinc(x) * sinc(x/a)  for |x| < a
/// L(x) = 0                     for |x| >= a
/// ```
fn lanczos_weight(x: f64, a: f64) -> f64 {
    if x.abs() < f64::EPSILON {
        return 1.0;
    }
    if x.abs() >= a {
        return 0.0;
    }

    let pi_x = std::f64::consts::PI * x;
    let pi_x_a = pi_x / a;

    (a * pi_x.sin() * pi_x_a.sin()) / (pi_x * pi_x)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Image where every pixel encodes its own position.
    fn test_image(width: u32, height: u32) -> DecodedImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        DecodedImage::new(width, height, pixels)
    }

    fn pixel(image: &DecodedImage, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * image.width + x) * 4) as usize;
        [
            image.pixels[idx],
            image.pixels[idx + 1],
            image.pixels[idx + 2],
            image.pixels[idx + 3],
        ]
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(360.0), 0.0);
        assert_eq!(normalize_angle(90.0), 90.0);
        assert_eq!(normalize_angle(180.0), 180.0);
        assert_eq!(normalize_angle(270.0), -90.0);
        assert_eq!(normalize_angle(-180.0), 180.0);
        assert_eq!(normalize_angle(450.0), 90.0);
    }

    #[test]
    fn test_identity() {
        for degrees in [0.0, 360.0] {
            let plan = rotate(300, 200, degrees);
            assert!(plan.is_identity());
            assert_eq!((plan.canvas_width, plan.canvas_height), (300, 200));
            assert_eq!((plan.origin_x, plan.origin_y), (0.0, 0.0));
        }
    }

    #[test]
    fn test_90_degrees() {
        let plan = rotate(300, 200, 90.0);
        assert_eq!((plan.canvas_width, plan.canvas_height), (200, 300));
        assert_eq!((plan.origin_x, plan.origin_y), (200.0, 0.0));
    }

    #[test]
    fn test_180_degrees() {
        let plan = rotate(300, 200, 180.0);
        assert_eq!((plan.canvas_width, plan.canvas_height), (300, 200));
        assert_eq!((plan.origin_x, plan.origin_y), (300.0, 200.0));
    }

    #[test]
    fn test_270_degrees() {
        let plan = rotate(300, 200, 270.0);
        assert_eq!(plan.angle, -90.0);
        assert_eq!((plan.canvas_width, plan.canvas_height), (200, 300));
        assert_eq!((plan.origin_x, plan.origin_y), (0.0, 300.0));
    }

    #[test]
    fn test_45_degrees() {
        let plan = rotate(100, 100, 45.0);
        // Diagonal of 100x100 square is ~141.4
        assert_eq!((plan.canvas_width, plan.canvas_height), (142, 142));
        assert!((plan.origin_x - 100.0 * std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert_eq!(plan.origin_y, 0.0);
    }

    #[test]
    fn test_small_square_45_keeps_far_corner() {
        let plan = rotate(10, 10, 45.0);
        assert_eq!((plan.canvas_width, plan.canvas_height), (15, 15));
        // The right corner lands at origin_x + 10 * cos(45) = 14.14.
        let right = plan.origin_x + 10.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert!(right <= plan.canvas_width as f64);
    }

    #[test]
    fn test_exact_extent_not_padded() {
        // 60 degrees on 100x100 spans 136.6; right angles stay exact.
        assert_eq!(rotate(100, 100, 60.0).canvas_width, 137);
        assert_eq!(rotate(7, 3, 180.0).canvas_width, 7);
        assert_eq!(rotate(7, 3, -90.0).canvas_height, 7);
    }

    #[test]
    fn test_obtuse_and_negative_quadrants() {
        let w = 100.0;
        let h = 50.0;

        let plan = rotate(100, 50, 135.0);
        let (s, c) = 135f64.to_radians().sin_cos();
        assert!((plan.origin_x - (s * h - c * w)).abs() < 1e-9);
        assert!((plan.origin_y - (-h * c)).abs() < 1e-9);

        let plan = rotate(100, 50, 300.0); // -60
        let (s, _) = (-60f64).to_radians().sin_cos();
        assert_eq!(plan.origin_x, 0.0);
        assert!((plan.origin_y - (-w * s)).abs() < 1e-9);

        let plan = rotate(100, 50, 200.0); // -160
        let (s, c) = (-160f64).to_radians().sin_cos();
        assert!((plan.origin_x - (-w * c)).abs() < 1e-9);
        assert!((plan.origin_y - (-w * s - h * c)).abs() < 1e-9);
    }

    #[test]
    fn test_complementary_rotations_same_bounds() {
        let a = rotate(100, 50, 30.0);
        let b = rotate(100, 50, 150.0);
        assert_eq!(
            (a.canvas_width, a.canvas_height),
            (b.canvas_width, b.canvas_height)
        );
    }

    #[test]
    fn test_draw_identity_is_clone() {
        let img = test_image(10, 5);
        let plan = rotate(10, 5, 0.0);
        let result = draw_rotated(&img, &plan, false, InterpolationFilter::Bilinear);
        assert_eq!(result.pixels, img.pixels);
    }

    #[test]
    fn test_draw_90_moves_corners() {
        let img = test_image(4, 3);
        let plan = rotate(4, 3, 90.0);
        let result = draw_rotated(&img, &plan, false, InterpolationFilter::Bilinear);

        assert_eq!((result.width, result.height), (3, 4));
        // Source top-left lands top-right, source bottom-left lands top-left.
        assert_eq!(pixel(&result, 2, 0), [0, 0, 0, 255]);
        assert_eq!(pixel(&result, 0, 0), [0, 2, 0, 255]);
        assert_eq!(pixel(&result, 0, 3), [3, 2, 0, 255]);
    }

    #[test]
    fn test_draw_180() {
        let img = test_image(4, 3);
        let plan = rotate(4, 3, 180.0);
        let result = draw_rotated(&img, &plan, false, InterpolationFilter::Bilinear);
        assert_eq!(pixel(&result, 0, 0), [3, 2, 0, 255]);
        assert_eq!(pixel(&result, 3, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn test_mirror_only() {
        let img = test_image(4, 3);
        let plan = rotate(4, 3, 0.0);
        let result = draw_rotated(&img, &plan, true, InterpolationFilter::Bilinear);
        assert_eq!(pixel(&result, 0, 0), [3, 0, 0, 255]);
        assert_eq!(pixel(&result, 3, 1), [0, 1, 0, 255]);
    }

    #[test]
    fn test_mirror_then_rotate_90() {
        let img = test_image(4, 3);
        let plan = rotate(4, 3, 90.0);
        let result = draw_rotated(&img, &plan, true, InterpolationFilter::Bilinear);
        // Mirrored top-left is source top-right; rotated 90 it lands top-right.
        assert_eq!(pixel(&result, 2, 0), [3, 0, 0, 255]);
    }

    #[test]
    fn test_draw_45_leaves_corners_transparent() {
        let img = DecodedImage::new(20, 20, vec![200; 20 * 20 * 4]);
        let plan = rotate(20, 20, 45.0);
        let result = draw_rotated(&img, &plan, false, InterpolationFilter::Bilinear);

        assert_eq!(pixel(&result, 0, 0)[3], 0);
        let (cx, cy) = (result.width / 2, result.height / 2);
        assert_eq!(pixel(&result, cx, cy), [200, 200, 200, 200]);
    }

    #[test]
    fn test_bilinear_vs_lanczos_dimensions() {
        let img = test_image(50, 50);
        let plan = rotate(50, 50, 15.0);
        let bilinear = draw_rotated(&img, &plan, false, InterpolationFilter::Bilinear);
        let lanczos = draw_rotated(&img, &plan, false, InterpolationFilter::Lanczos3);
        assert_eq!(
            (bilinear.width, bilinear.height),
            (lanczos.width, lanczos.height)
        );
    }

    #[test]
    fn test_filter_for_scale() {
        assert_eq!(InterpolationFilter::for_scale(2.0), InterpolationFilter::Lanczos3);
        assert_eq!(InterpolationFilter::for_scale(1.0), InterpolationFilter::Bilinear);
        assert_eq!(InterpolationFilter::for_scale(0.25), InterpolationFilter::Bilinear);
    }

    #[test]
    fn test_lanczos_weight() {
        assert!((lanczos_weight(0.0, 3.0) - 1.0).abs() < f64::EPSILON);
        assert!(lanczos_weight(3.0, 3.0).abs() < f64::EPSILON);
        assert!((lanczos_weight(1.5, 3.0) - lanczos_weight(-1.5, 3.0)).abs() < 1e-10);
    }

    #[test]
    fn test_1x1_image_rotation() {
        let img = DecodedImage::new(1, 1, vec![128, 128, 128, 255]);
        let plan = rotate(1, 1, 45.0);
        let result = draw_rotated(&img, &plan, false, InterpolationFilter::Lanczos3);
        assert!(result.width >= 1 && result.height >= 1);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: Rotated canvas covers every corner of the rotated rectangle.
        #[test]
        fn prop_corners_inside_canvas(
            (w, h) in (1u32..=2000, 1u32..=2000),
            degrees in 0.0f64..=360.0,
        ) {
            let plan = rotate(w, h, degrees);
            let (s, c) = sin_cos(plan.angle);
            for (x, y) in [(0.0, 0.0), (w as f64, 0.0), (0.0, h as f64), (w as f64, h as f64)] {
                let cx = plan.origin_x + x * c - y * s;
                let cy = plan.origin_y + x * s + y * c;
                prop_assert!(cx >= -1e-6 && cx <= plan.canvas_width as f64 + 1e-5);
                prop_assert!(cy >= -1e-6 && cy <= plan.canvas_height as f64 + 1e-5);
            }
        }

        /// Property: 90 and 270 degrees swap the dimensions exactly.
        #[test]
        fn prop_right_angles_swap((w, h) in (1u32..=5000, 1u32..=5000)) {
            for degrees in [90.0, 270.0] {
                let plan = rotate(w, h, degrees);
                prop_assert_eq!((plan.canvas_width, plan.canvas_height), (h, w));
            }
        }
    }
}
