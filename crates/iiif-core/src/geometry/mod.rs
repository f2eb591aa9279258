//! Request interpretation: from a [`RequestSpec`](crate::request::RequestSpec)
//! and the source dimensions to exact pixel geometry.
//!
//! [`resolve`] is a pure function. It holds no state, takes no locks and can
//! be called from any number of request tasks at once. The [`ProcessState`]
//! it returns is threaded read-only through decoding and the pipeline.
//!
//! # Coordinate System
//!
//! - Origin is the top-left corner of the source image
//! - Region coordinates are source pixels
//! - Output extents are pixels of the canvas before rotation

mod resolve;
mod state;

pub use resolve::resolve;
pub use state::{CropRegion, Extent, GeometryError, ProcessState, DEFAULT_DPI};
