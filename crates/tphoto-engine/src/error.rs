//! Engine error types.

use thiserror::Error;

use tphoto_backend::BackendError;
use tphoto_cache::StorageError;
use tphoto_media::MediaError;
use tphoto_models::ModelError;
use tphoto_render::RenderError;
use tphoto_tracking::TrackingError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No poster detected before the detection timeout")]
    DetectionTimeout,

    #[error("Storage full: {0}")]
    StorageFull(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-readable kind, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::DetectionTimeout => "detection_timeout",
            EngineError::StorageFull(_) => "storage_full",
            EngineError::Network(_) => "network",
            EngineError::GenerationFailed(_) => "generation_failed",
            EngineError::ChecksumMismatch { .. } => "checksum_mismatch",
            EngineError::Decode(_) => "decode",
            EngineError::Cancelled => "cancelled",
            EngineError::Config(_) => "config",
            EngineError::Storage(_) => "storage",
            EngineError::Render(_) => "render",
            EngineError::Tracking(_) => "tracking",
            EngineError::Io(_) => "io",
        }
    }

    /// Check if a new attempt may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::ChecksumMismatch { .. } | EngineError::Decode(_)
        )
    }

    /// Check if the user can fix the condition (free space, reconnect, aim the camera).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            EngineError::StorageFull(_) | EngineError::Network(_) | EngineError::DetectionTimeout
        )
    }

    /// Message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::DetectionTimeout => {
                "No poster found. Point your camera at a poster and tap refresh.".to_string()
            }
            EngineError::StorageFull(_) => {
                "Not enough storage space to save this video. Free up some space and try again."
                    .to_string()
            }
            EngineError::Network(_) => {
                "Couldn't reach the server. Check your internet connection and try again.".to_string()
            }
            EngineError::GenerationFailed(_) => {
                "This poster couldn't be brought to life right now. Please try again later.".to_string()
            }
            EngineError::ChecksumMismatch { .. } | EngineError::Decode(_) => {
                "The video could not be played. Please try again.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::GenerationFailed(msg) => EngineError::GenerationFailed(msg),
            BackendError::Timeout(secs) => {
                EngineError::GenerationFailed(format!("no result after {} seconds", secs))
            }
            BackendError::Config(msg) => EngineError::Config(msg),
            BackendError::Io(e) if is_no_space(&e) => EngineError::StorageFull(e.to_string()),
            BackendError::Io(e) => EngineError::Io(e),
            other => EngineError::Network(other.to_string()),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        if err.is_storage_full() {
            return EngineError::StorageFull(err.to_string());
        }
        match err {
            StorageError::ChecksumMismatch { expected, actual } => {
                EngineError::ChecksumMismatch { expected, actual }
            }
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<MediaError> for EngineError {
    fn from(err: MediaError) -> Self {
        EngineError::Decode(err.to_string())
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        EngineError::Config(err.to_string())
    }
}

fn is_no_space(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_mapping() {
        let err: EngineError = BackendError::Timeout(60).into();
        assert!(matches!(err, EngineError::GenerationFailed(_)));

        let err: EngineError = BackendError::from_http_status(503, "busy").into();
        assert!(matches!(err, EngineError::Network(_)));
        assert!(err.is_user_actionable());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: EngineError = StorageError::storage_full("budget exceeded").into();
        assert!(matches!(err, EngineError::StorageFull(_)));
        assert!(err.user_message().contains("storage space"));

        let err: EngineError = StorageError::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::ChecksumMismatch { .. }));
        assert!(!err.is_user_actionable());
    }

    #[test]
    fn test_no_space_io_is_storage_full() {
        let err: EngineError = BackendError::Io(std::io::Error::from_raw_os_error(28)).into();
        assert!(matches!(err, EngineError::StorageFull(_)));
    }
}
