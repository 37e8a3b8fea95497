//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while writing to the cache.
///
/// Reads never fail: corruption and expiry surface as a cache miss.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cache storage full: {0}")]
    StorageFull(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn storage_full(msg: impl Into<String>) -> Self {
        Self::StorageFull(msg.into())
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    /// Check if the failure is a lack of space.
    pub fn is_storage_full(&self) -> bool {
        match self {
            StorageError::StorageFull(_) => true,
            StorageError::Io(e) => is_no_space_error(e),
            _ => false,
        }
    }
}

/// Check if an IO error is ENOSPC (no space left on device).
pub(crate) fn is_no_space_error(e: &std::io::Error) -> bool {
    // ENOSPC is error code 28 on Linux/macOS
    e.raw_os_error() == Some(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_storage_full() {
        assert!(StorageError::storage_full("budget").is_storage_full());
        assert!(StorageError::Io(std::io::Error::from_raw_os_error(28)).is_storage_full());
        assert!(!StorageError::Io(std::io::Error::from_raw_os_error(2)).is_storage_full());
        assert!(!StorageError::invalid_key("").is_storage_full());
    }
}
