//! Tracking configuration.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TrackingConfig {
    /// Time without a detection before `DetectionTimeout` fires
    pub detection_timeout: Duration,
    /// Time on last-known-pose updates before a poster counts as out of frame
    pub out_of_frame_grace: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            detection_timeout: Duration::from_secs(10),
            out_of_frame_grace: Duration::from_millis(1500),
        }
    }
}

impl TrackingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detection_timeout: std::env::var("TPHOTO_DETECTION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.detection_timeout),
            out_of_frame_grace: std::env::var("TPHOTO_OUT_OF_FRAME_GRACE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.out_of_frame_grace),
        }
    }
}
