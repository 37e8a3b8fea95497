//! Tracking metrics collection.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Posters detected (new anchor created).
    pub const DETECTIONS_TOTAL: &str = "tphoto_tracking_detections_total";

    /// Poster losses by reason.
    pub const LOSSES_TOTAL: &str = "tphoto_tracking_losses_total";

    /// Scanning attempts that hit the detection timeout.
    pub const DETECTION_TIMEOUTS_TOTAL: &str = "tphoto_tracking_detection_timeouts_total";
}

pub fn record_detection() {
    counter!(names::DETECTIONS_TOTAL).increment(1);
}

pub fn record_loss(reason: &'static str) {
    counter!(names::LOSSES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_detection_timeout() {
    counter!(names::DETECTION_TIMEOUTS_TOTAL).increment(1);
}
