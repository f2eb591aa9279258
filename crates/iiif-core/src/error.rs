//! Request-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::decode::DecodeError;
use crate::encode::EncodeError;
use crate::geometry::GeometryError;
use crate::request::ParseError;

/// Everything that can fail while serving one image request.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidGeometry(#[from] GeometryError),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Request could not be parsed")]
    Parse(#[from] ParseError),

    /// Decoder and byte source failures, passed through unchanged.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Encoding failed")]
    Encode(#[source] EncodeError),

    #[error("Configuration error")]
    Config(#[from] ConfigError),

    #[error("Request {id} was cancelled")]
    Cancelled { id: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<EncodeError> for PipelineError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::UnsupportedFormat(format) => PipelineError::UnsupportedFormat(format),
            other => PipelineError::Encode(other),
        }
    }
}

impl PipelineError {
    /// Errors caused by the request itself. Never worth retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidGeometry(_)
                | PipelineError::UnsupportedFormat(_)
                | PipelineError::Parse(_)
        )
    }

    /// The source could not be read or decoded.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
