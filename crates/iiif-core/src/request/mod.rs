//! Request description for the IIIF Image API.
//!
//! A request names a region of the source image, the size that region is
//! scaled to, a rotation (optionally mirrored), a quality and an output
//! format. The wire grammar from the URL path is parsed here; everything
//! downstream works on the typed [`RequestSpec`].
//!
//! # Example
//!
//! ```ignore
//! use iiif_core::request::RequestSpec;
//!
//! let spec = RequestSpec::from_path_segments("page-1", "full", "!150,150", "0", "default.jpg")?;
//! ```

mod parse;
mod types;

pub use parse::ParseError;
pub use types::{
    QualityMode, RegionMode, RegionSpec, RequestSpec, RotationSpec, SizeMode, SizeSpec,
};
