//! Reference poster registration data.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::lip::LipCoordinates;

/// Tracking state reported by the AR platform for a trackable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingState::Tracking => "tracking",
            TrackingState::Paused => "paused",
            TrackingState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static registration data for a printed poster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePoster {
    /// Stable poster identifier (also the trackable name in the image database)
    pub poster_id: String,
    /// Only face-bearing posters are eligible for tracking
    pub has_human_face: bool,
    /// Where the mouth sits on the poster
    pub lip_region: LipCoordinates,
    /// Reference image used to build the tracking database
    pub reference_image: PathBuf,
    /// Printed width in meters, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_width_m: Option<f32>,
}

impl ReferencePoster {
    /// Create a validated reference poster.
    pub fn new(
        poster_id: impl Into<String>,
        has_human_face: bool,
        lip_region: LipCoordinates,
        reference_image: impl Into<PathBuf>,
        physical_width_m: Option<f32>,
    ) -> ModelResult<Self> {
        let poster_id = poster_id.into();
        if poster_id.trim().is_empty() {
            return Err(ModelError::invalid_poster("poster id must not be empty"));
        }
        if let Some(width) = physical_width_m {
            if !(width.is_finite() && width > 0.0) {
                return Err(ModelError::invalid_poster(format!(
                    "physical width must be positive, got {}",
                    width
                )));
            }
        }
        Ok(Self {
            poster_id,
            has_human_face,
            lip_region,
            reference_image: reference_image.into(),
            physical_width_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lip() -> LipCoordinates {
        LipCoordinates::new(0.4, 0.6, 0.2, 0.1).unwrap()
    }

    #[test]
    fn test_reference_poster_validation() {
        assert!(ReferencePoster::new("ad-42", true, lip(), "ad-42.jpg", Some(0.6)).is_ok());
        assert!(ReferencePoster::new("  ", true, lip(), "x.jpg", None).is_err());
        assert!(ReferencePoster::new("ad-1", true, lip(), "x.jpg", Some(0.0)).is_err());
    }

    #[test]
    fn test_tracking_state_display() {
        assert_eq!(TrackingState::Paused.to_string(), "paused");
    }
}
