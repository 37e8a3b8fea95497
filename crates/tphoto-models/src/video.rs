//! Cached video records and decoder output.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lip::LipCoordinates;

/// Immutable snapshot of a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedVideo {
    /// Cache key
    pub poster_id: String,
    /// Backing file inside the cache directory
    pub video_path: PathBuf,
    pub lip_coordinates: LipCoordinates,
    /// Lowercase hex SHA-256 of the backing file
    pub checksum: String,
    pub cached_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Video stream information produced by a decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration_ms: u64,
    pub frame_rate_fps: f64,
    /// Video codec name (e.g. `h264`)
    pub codec: String,
    pub has_video_track: bool,
    pub has_audio_track: bool,
    /// Container format names as reported by the demuxer (e.g. `mov,mp4,m4a`)
    #[serde(default)]
    pub container: String,
    /// Codec profile when reported (e.g. `Constrained Baseline`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Absolute audio/video start or duration mismatch in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub av_drift_ms: Option<f64>,
}

impl VideoInfo {
    /// Bytes in one RGBA frame.
    pub fn rgba_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}
