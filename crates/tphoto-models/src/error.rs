//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Lip coordinate `{field}` out of range [0, 1]: {value}")]
    CoordinateOutOfRange { field: &'static str, value: f64 },

    #[error("Invalid poster dimensions: {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },

    #[error("Invalid poster: {0}")]
    InvalidPoster(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ModelError {
    pub fn invalid_poster(msg: impl Into<String>) -> Self {
        Self::InvalidPoster(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
