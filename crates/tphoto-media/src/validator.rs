//! Container and codec acceptance policy.

use std::fmt;

use tracing::warn;

use tphoto_models::VideoInfo;

use crate::error::{MediaError, MediaResult};

/// A single finding from [`FormatValidator::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    MissingVideoTrack,
    UnsupportedCodec { codec: String },
    UnsupportedContainer { container: String },
    LowFrameRate { fps: f64 },
    AvDrift { drift_ms: f64 },
}

impl ValidationIssue {
    /// Hard errors reject the source; everything else is a warning.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ValidationIssue::MissingVideoTrack | ValidationIssue::UnsupportedCodec { .. }
        )
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingVideoTrack => write!(f, "no video track"),
            ValidationIssue::UnsupportedCodec { codec } => write!(f, "unsupported codec '{}'", codec),
            ValidationIssue::UnsupportedContainer { container } => {
                write!(f, "unsupported container '{}'", container)
            }
            ValidationIssue::LowFrameRate { fps } => write!(f, "low frame rate {:.2} fps", fps),
            ValidationIssue::AvDrift { drift_ms } => write!(f, "audio/video drift {:.1} ms", drift_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(ValidationIssue::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| !i.is_error())
    }
}

/// Checks decoded stream information against the playback requirements.
#[derive(Debug, Clone)]
pub struct FormatValidator {
    pub required_codec: String,
    /// Accepted demuxer names; a container matches if any of its names is listed.
    pub accepted_containers: Vec<String>,
    pub min_frame_rate: f64,
    pub max_av_drift_ms: f64,
}

impl Default for FormatValidator {
    fn default() -> Self {
        Self {
            required_codec: "h264".to_string(),
            accepted_containers: vec!["mp4".to_string(), "mov".to_string()],
            min_frame_rate: 25.0,
            max_av_drift_ms: 50.0,
        }
    }
}

impl FormatValidator {
    pub fn validate(&self, info: &VideoInfo) -> ValidationReport {
        let mut issues = Vec::new();

        if !info.has_video_track {
            issues.push(ValidationIssue::MissingVideoTrack);
            return ValidationReport { issues };
        }

        if !info.codec.eq_ignore_ascii_case(&self.required_codec) {
            issues.push(ValidationIssue::UnsupportedCodec {
                codec: info.codec.clone(),
            });
        }

        // Unknown container (empty) is left to the codec check.
        if !info.container.is_empty()
            && !info
                .container
                .split(',')
                .any(|name| self.accepted_containers.iter().any(|c| c.eq_ignore_ascii_case(name.trim())))
        {
            issues.push(ValidationIssue::UnsupportedContainer {
                container: info.container.clone(),
            });
        }

        if info.frame_rate_fps < self.min_frame_rate {
            issues.push(ValidationIssue::LowFrameRate {
                fps: info.frame_rate_fps,
            });
        }

        if let Some(drift_ms) = info.av_drift_ms {
            if drift_ms > self.max_av_drift_ms {
                issues.push(ValidationIssue::AvDrift { drift_ms });
            }
        }

        ValidationReport { issues }
    }

    /// Validate, logging warnings, and fail on the first hard error.
    pub fn ensure_valid(&self, info: &VideoInfo) -> MediaResult<ValidationReport> {
        let report = self.validate(info);

        for warning in report.warnings() {
            warn!(issue = %warning, "Video format warning");
        }

        if let Some(error) = report.errors().next() {
            return Err(match error {
                ValidationIssue::MissingVideoTrack => MediaError::invalid_video(error.to_string()),
                _ => MediaError::UnsupportedFormat(error.to_string()),
            });
        }

        Ok(report)
    }
}
