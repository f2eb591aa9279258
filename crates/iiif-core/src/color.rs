//! Quality (rendering intent) filters.
//!
//! Filters are 4x5 color matrices in the usual row-major layout: each output
//! channel is a weighted sum of the input RGBA channels plus a bias, all on
//! the 0-255 scale. Gray is the ITU-R BT.709 luminance matrix followed by a
//! contrast reduction about mid-gray. Bitonal thresholds the plain luminance.

use crate::decode::DecodedImage;
use crate::request::QualityMode;

/// ITU-R BT.709 coefficient for red channel in luminance calculation.
pub const LUMINANCE_R: f32 = 0.2126;

/// ITU-R BT.709 coefficient for green channel in luminance calculation.
pub const LUMINANCE_G: f32 = 0.7152;

/// ITU-R BT.709 coefficient for blue channel in luminance calculation.
pub const LUMINANCE_B: f32 = 0.0722;

/// Default bitonal cut-off: luminance at or above this is white.
pub const DEFAULT_BITONAL_THRESHOLD: u8 = 180;

/// Default contrast factor for gray output. 1.0 keeps full contrast.
pub const DEFAULT_GRAY_CONTRAST: f32 = 0.8;

/// Mid-gray pivot for contrast scaling.
const MID_GRAY: f32 = 128.0;

/// Row-major 4x5 color matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [f32; 20]);

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix([
        1.0, 0.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0, //
    ]);

    /// Luminance replicated into R, G and B; alpha untouched.
    pub const GRAYSCALE: ColorMatrix = ColorMatrix([
        LUMINANCE_R, LUMINANCE_G, LUMINANCE_B, 0.0, 0.0, //
        LUMINANCE_R, LUMINANCE_G, LUMINANCE_B, 0.0, 0.0, //
        LUMINANCE_R, LUMINANCE_G, LUMINANCE_B, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0, //
    ]);

    /// Scale R, G and B about mid-gray: `c * (v - 128) + 128`.
    pub fn contrast(factor: f32) -> ColorMatrix {
        let bias = MID_GRAY * (1.0 - factor);
        ColorMatrix([
            factor, 0.0, 0.0, 0.0, bias, //
            0.0, factor, 0.0, 0.0, bias, //
            0.0, 0.0, factor, 0.0, bias, //
            0.0, 0.0, 0.0, 1.0, 0.0, //
        ])
    }

    #[inline]
    pub fn apply(&self, px: [u8; 4]) -> [u8; 4] {
        let m = &self.0;
        let input = [px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32];
        let mut out = [0u8; 4];
        for (row, value) in out.iter_mut().enumerate() {
            let r = &m[row * 5..row * 5 + 5];
            let v = r[0] * input[0] + r[1] * input[1] + r[2] * input[2] + r[3] * input[3] + r[4];
            *value = v.clamp(0.0, 255.0).round() as u8;
        }
        out
    }
}

/// One step of a quality filter chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorOp {
    Matrix(ColorMatrix),
    /// Gray input at or above the level becomes opaque white, else opaque black.
    Threshold(u8),
}

impl ColorOp {
    #[inline]
    fn apply(&self, px: [u8; 4]) -> [u8; 4] {
        match self {
            ColorOp::Matrix(matrix) => matrix.apply(px),
            ColorOp::Threshold(level) => {
                let v = if px[0] >= *level { 255 } else { 0 };
                [v, v, v, 255]
            }
        }
    }
}

/// Filter chain for a quality mode.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFilter {
    ops: Vec<ColorOp>,
}

impl QualityFilter {
    /// Build the chain for `quality`. `threshold` only matters for bitonal,
    /// `gray_contrast` only for gray.
    pub fn for_quality(quality: QualityMode, threshold: u8, gray_contrast: f32) -> Self {
        let ops = match quality {
            QualityMode::Default | QualityMode::Color => Vec::new(),
            QualityMode::Gray => vec![
                ColorOp::Matrix(ColorMatrix::GRAYSCALE),
                ColorOp::Matrix(ColorMatrix::contrast(gray_contrast)),
            ],
            QualityMode::Bitonal => vec![
                ColorOp::Matrix(ColorMatrix::GRAYSCALE),
                ColorOp::Threshold(threshold),
            ],
        };
        Self { ops }
    }

    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply the chain to every pixel in place.
    pub fn apply(&self, image: &mut DecodedImage) {
        if self.is_identity() {
            return;
        }
        for chunk in image.pixels.chunks_exact_mut(4) {
            let mut px = [chunk[0], chunk[1], chunk[2], chunk[3]];
            for op in &self.ops {
                px = op.apply(px);
            }
            chunk.copy_from_slice(&px);
        }
    }
}
