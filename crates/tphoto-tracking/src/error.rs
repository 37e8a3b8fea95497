//! Tracking error types.

use thiserror::Error;

pub type TrackingResult<T> = Result<T, TrackingError>;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("No eligible posters: at least one poster must have a human face")]
    NoEligiblePosters,

    #[error("Invalid poster: {0}")]
    InvalidPoster(String),

    #[error("Anchor creation failed: {0}")]
    AnchorCreation(String),

    #[error("Tracking source error: {0}")]
    Source(String),
}

impl TrackingError {
    pub fn anchor_creation(msg: impl Into<String>) -> Self {
        Self::AnchorCreation(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }
}
