//! Backend client error types.

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            500..=599 | 429 => Self::ServiceUnavailable(format!("HTTP {}: {}", status, body)),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Transient failures a status poll may ride out until the poll deadline.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::ServiceUnavailable(_) | BackendError::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(BackendError::from_http_status(503, "down").is_retryable());
        assert!(BackendError::from_http_status(429, "slow down").is_retryable());
        let err = BackendError::from_http_status(404, "no such job");
        assert!(matches!(err, BackendError::RequestFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_generation_failed_not_retryable() {
        assert!(!BackendError::generation_failed("voice unavailable").is_retryable());
        assert!(!BackendError::Timeout(60).is_retryable());
    }
}
