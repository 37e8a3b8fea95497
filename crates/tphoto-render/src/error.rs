//! Render error types.

use thiserror::Error;
use tphoto_models::ModelError;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid poster dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error(transparent)]
    Model(#[from] ModelError),
}
