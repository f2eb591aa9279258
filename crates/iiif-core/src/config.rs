//! Server settings.
//!
//! Loaded from an optional `iiif.{toml,yaml,json}` file, overridden by
//! `IIIF__`-prefixed environment variables (`IIIF__MAX_WIDTH=4000`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::{DEFAULT_BITONAL_THRESHOLD, DEFAULT_GRAY_CONTRAST};
use crate::geometry::DEFAULT_DPI;
use crate::pipeline::QualityConfig;
use crate::request::RequestSpec;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Image server settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageServerConfig {
    /// Output width ceiling in pixels. Unbounded when absent.
    pub max_width: Option<u32>,
    /// Output height ceiling in pixels. Unbounded when absent.
    pub max_height: Option<u32>,
    /// Output area ceiling. Carried on requests but not enforced by
    /// geometry resolution.
    pub max_area: Option<u64>,
    /// Whether `^` size requests may produce output larger than the region.
    pub allow_upscale: bool,
    /// Compression quality for lossy encoders, 1 to 100.
    pub jpeg_quality: u8,
    /// Gray level at or above which bitonal output is white.
    pub bitonal_threshold: u8,
    /// Contrast factor for gray output, in (0, 1]. 1.0 keeps full contrast.
    pub gray_contrast: f32,
    /// Resolution assumed for sources that record none.
    pub default_dpi: u16,
}

impl Default for ImageServerConfig {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_area: None,
            allow_upscale: false,
            jpeg_quality: 90,
            bitonal_threshold: DEFAULT_BITONAL_THRESHOLD,
            gray_contrast: DEFAULT_GRAY_CONTRAST,
            default_dpi: DEFAULT_DPI,
        }
    }
}

impl ImageServerConfig {
    /// Reject settings that can never produce an image.
    pub fn validate(self) -> Result<Self, ConfigError> {
        let zero = |name: &str| ConfigError::Invalid {
            message: format!("{name} must be greater than zero"),
        };
        if self.max_width == Some(0) {
            return Err(zero("max_width"));
        }
        if self.max_height == Some(0) {
            return Err(zero("max_height"));
        }
        if self.max_area == Some(0) {
            return Err(zero("max_area"));
        }
        if self.default_dpi == 0 {
            return Err(zero("default_dpi"));
        }
        if !(self.gray_contrast > 0.0 && self.gray_contrast <= 1.0) {
            return Err(ConfigError::Invalid {
                message: format!("gray_contrast must be in (0, 1], got {}", self.gray_contrast),
            });
        }
        Ok(self)
    }

    /// Stamp the server ceilings onto `spec`, keeping any tighter limit the
    /// request already carries.
    pub fn apply_limits(&self, spec: RequestSpec) -> RequestSpec {
        fn tighter<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        }
        let max_width = tighter(spec.max_width, self.max_width);
        let max_height = tighter(spec.max_height, self.max_height);
        let max_area = tighter(spec.max_area, self.max_area);
        spec.with_limits(max_width, max_height, max_area)
    }

    pub fn quality_config(&self) -> QualityConfig {
        QualityConfig {
            quality: self.jpeg_quality.clamp(1, 100),
            bitonal_threshold: self.bitonal_threshold,
            gray_contrast: self.gray_contrast,
        }
    }
}

/// Load configuration from `iiif.*` in the working directory and the
/// environment.
pub fn load_config() -> Result<ImageServerConfig, ConfigError> {
    load_config_from("iiif")
}

/// Load configuration from the named file (extension optional) and the
/// environment.
pub fn load_config_from(name: &str) -> Result<ImageServerConfig, ConfigError> {
    let config: ImageServerConfig = Config::builder()
        .add_source(File::with_name(name).required(false))
        .add_source(
            Environment::with_prefix("IIIF")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()
}
