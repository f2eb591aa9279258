//! Parsers for the IIIF path segments.
//!
//! `{region}/{size}/{rotation}/{quality}.{format}` segments arrive already
//! percent-decoded; each segment has its own `FromStr` impl.

use std::str::FromStr;

use thiserror::Error;

use super::types::{QualityMode, RegionSpec, RequestSpec, RotationSpec, SizeSpec};

/// Malformed request segment.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid rotation: {0}")]
    InvalidRotation(String),

    #[error("Invalid quality: {0}")]
    InvalidQuality(String),

    #[error("Missing format extension in {0:?}")]
    MissingFormat(String),
}

impl FromStr for RegionSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidRegion(s.to_string());
        match s {
            "full" => return Ok(RegionSpec::full()),
            "square" => return Ok(RegionSpec::square()),
            _ => {}
        }

        let (percent, body) = match s.strip_prefix("pct:") {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let values = parse_list(body).ok_or_else(invalid)?;
        let [x, y, w, h] = <[f64; 4]>::try_from(values).map_err(|_| invalid())?;
        if w <= 0.0 || h <= 0.0 {
            return Err(invalid());
        }

        Ok(if percent {
            RegionSpec::percentage(x, y, w, h)
        } else {
            RegionSpec::region(x, y, w, h)
        })
    }
}

impl FromStr for SizeSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidSize(s.to_string());
        let (upscale, body) = match s.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let size = match body {
            "max" => SizeSpec::max(),
            "full" => SizeSpec::full(),
            _ => {
                if let Some(pct) = body.strip_prefix("pct:") {
                    let n: f64 = pct.parse().map_err(|_| invalid())?;
                    if !n.is_finite() || n <= 0.0 {
                        return Err(invalid());
                    }
                    SizeSpec::percentage(n / 100.0)
                } else if let Some(fit) = body.strip_prefix('!') {
                    match parse_dimensions(fit).ok_or_else(invalid)? {
                        (Some(w), Some(h)) => SizeSpec::best_fit(Some(w), Some(h)),
                        _ => return Err(invalid()),
                    }
                } else {
                    match parse_dimensions(body).ok_or_else(invalid)? {
                        (None, None) => return Err(invalid()),
                        (w, h) => SizeSpec::distort(w, h),
                    }
                }
            }
        };

        Ok(if upscale { size.with_upscale() } else { size })
    }
}

impl FromStr for RotationSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidRotation(s.to_string());
        let (mirror, body) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let degrees: f64 = body.parse().map_err(|_| invalid())?;
        if !(0.0..=360.0).contains(&degrees) {
            return Err(invalid());
        }
        Ok(RotationSpec::new(degrees, mirror))
    }
}

impl FromStr for QualityMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(QualityMode::Default),
            "color" => Ok(QualityMode::Color),
            "gray" | "grey" => Ok(QualityMode::Gray),
            "bitonal" => Ok(QualityMode::Bitonal),
            _ => Err(ParseError::InvalidQuality(s.to_string())),
        }
    }
}

impl RequestSpec {
    /// Build a request from the raw path segments.
    ///
    /// The format is taken verbatim from the extension of the last segment;
    /// it is checked against the encoder table later so unsupported formats
    /// fail before decoding.
    pub fn from_path_segments(
        id: &str,
        region: &str,
        size: &str,
        rotation: &str,
        quality_format: &str,
    ) -> Result<Self, ParseError> {
        let (quality, format) = quality_format
            .rsplit_once('.')
            .filter(|(_, ext)| !ext.is_empty())
            .ok_or_else(|| ParseError::MissingFormat(quality_format.to_string()))?;

        Ok(RequestSpec::new(id, format.to_ascii_lowercase())
            .with_region(region.parse()?)
            .with_size(size.parse()?)
            .with_rotation(rotation.parse()?)
            .with_quality(quality.parse()?))
    }
}

/// Parse a comma separated list of non-empty numbers.
fn parse_list(s: &str) -> Option<Vec<f64>> {
    s.split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

/// Parse `w,h` where either side may be empty.
fn parse_dimensions(s: &str) -> Option<(Option<u32>, Option<u32>)> {
    let (w, h) = s.split_once(',')?;
    let side = |v: &str| -> Option<Option<u32>> {
        if v.is_empty() {
            return Some(None);
        }
        match v.parse::<u32>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(Some(n)),
        }
    };
    Some((side(w)?, side(h)?))
}
