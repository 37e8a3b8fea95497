//! Lip-sync generation jobs and status polling.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::lip::LipCoordinates;

/// Backend-assigned identifier of a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation job status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a generator
    #[default]
    Pending,
    /// Video is being generated
    Processing,
    /// Video is ready for download
    Complete,
    /// Generation failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Poster the video is generated for
    #[validate(length(min = 1))]
    pub poster_id: String,
    /// Dialogue the avatar speaks
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    /// Voice used for synthesis
    #[validate(length(min = 1))]
    pub voice_id: String,
}

impl GenerateRequest {
    /// Create a validated generation request.
    pub fn new(
        poster_id: impl Into<String>,
        text: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> ModelResult<Self> {
        let request = Self {
            poster_id: poster_id.into(),
            text: text.into(),
            voice_id: voice_id.into(),
        };
        request
            .validate()
            .map_err(|e| ModelError::invalid_request(e.to_string()))?;
        Ok(request)
    }
}

/// Response of `POST generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub video_id: JobId,
}

/// Response of `GET status/{videoId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub video_id: JobId,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lip_coordinates: Option<LipCoordinates>,
    /// Lowercase hex SHA-256 of the asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusResponse {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
