//! Decode collaborator seam.
//!
//! This module provides:
//! - Byte sources with explicit capabilities (seekable vs. sequential)
//! - At-most-once container format detection per source
//! - The [`RegionDecoder`] trait and an `image`-crate implementation
//! - Resampling of decoded regions to the output extent
//!
//! # Architecture
//!
//! Decoding may block on I/O. The request driver runs it on a blocking
//! task; geometry and pipeline code never touch a byte source.

mod decoder;
mod resize;
mod source;
mod types;

pub use decoder::{extract_dpi, ImageCrateDecoder, RegionDecoder};
pub use resize::{resample_scale, resample_to_output, resize};
pub use source::{
    FileSource, ImageSource, MemorySource, RandomAccessByteSource, SequentialSource,
    SourceCapabilities,
};
pub use types::{DecodeError, DecodedImage, DecodedRegion, FilterType, SourceInfo};
