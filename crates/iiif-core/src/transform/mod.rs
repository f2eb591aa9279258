//! Pixel transforms: region cropping and rotated canvas drawing.
//!
//! # Transform Order
//!
//! For a request the pixels go through:
//! 1. Crop to the resolved region (decoder side)
//! 2. Resample to the output extent
//! 3. Quality filter
//! 4. Mirror, then rotate onto the bounding canvas
//!
//! # Coordinate System
//!
//! - Rotation angles are in degrees, positive = clockwise
//! - Crop coordinates are source pixels
//! - Origin is top-left corner

mod crop;
mod rotation;

pub use crop::apply_crop;
pub use rotation::{
    draw_rotated, normalize_angle, rotate, InterpolationFilter, RotationPlan,
};
