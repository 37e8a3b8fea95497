//! FFprobe stream inspection.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use tphoto_models::VideoInfo;

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    start_time: Option<String>,
    duration: Option<String>,
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Probe a media file for stream information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe could not read {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let info = parse_probe_output(&output.stdout)?;
    debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.frame_rate_fps,
        codec = %info.codec,
        "Probed video"
    );
    Ok(info)
}

/// Build [`VideoInfo`] from ffprobe's JSON output.
///
/// Fails when no video or audio track is present at all. A source with
/// only audio yields `has_video_track = false` so callers can reject it.
pub fn parse_probe_output(json: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    if video.is_none() && audio.is_none() {
        return Err(MediaError::invalid_video("no tracks found"));
    }

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| video.and_then(|v| v.duration.as_deref()).and_then(parse_seconds))
        .unwrap_or(0.0);

    // avg_frame_rate is "0/0" for some streams; fall back to r_frame_rate.
    let fps = video
        .and_then(|v| {
            v.avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| v.r_frame_rate.as_deref().and_then(parse_frame_rate))
        })
        .unwrap_or(0.0);

    let av_drift_ms = match (video, audio) {
        (Some(v), Some(a)) => {
            let v_start = v.start_time.as_deref().and_then(parse_seconds);
            let a_start = a.start_time.as_deref().and_then(parse_seconds);
            match (v_start, a_start) {
                (Some(v), Some(a)) => Some(((v - a) * 1000.0).abs()),
                _ => None,
            }
        }
        _ => None,
    };

    Ok(VideoInfo {
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        duration_ms: (duration_secs * 1000.0).round() as u64,
        frame_rate_fps: fps,
        codec: video
            .and_then(|v| v.codec_name.clone())
            .unwrap_or_default(),
        has_video_track: video.is_some(),
        has_audio_track: audio.is_some(),
        container: probe.format.format_name.unwrap_or_default(),
        profile: video.and_then(|v| v.profile.clone()),
        av_drift_ms,
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Highest frame rate taken at face value; anything above is treated as unknown.
pub const MAX_FRAME_RATE: f64 = 240.0;

/// Parse frame rate string (e.g., "30/1" or "29.97").
///
/// Zero, non-finite and implausibly high rates yield `None`.
pub(crate) fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den <= 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0 && fps <= MAX_FRAME_RATE).then_some(fps)
}
