//! Decoder abstraction.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tphoto_models::VideoInfo;

use crate::error::MediaResult;
use crate::surface::FrameSurface;

/// Transport state of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing loaded
    #[default]
    Idle,
    /// Source opened, not playing
    Ready,
    Playing,
    Paused,
    /// Stopped with position reset to zero
    Stopped,
    /// Reached the end of a non-looping source
    Ended,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Ended => "ended",
        }
    }
}

/// Events a decoder publishes on its channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    Ready(VideoInfo),
    FirstFrameRendered,
    PlaybackStateChanged(PlaybackState),
    VideoSizeChanged { width: u32, height: u32 },
    Error(String),
}

/// A video decoding and playback engine drawing into a [`FrameSurface`].
///
/// Transport controls are best-effort. Events are delivered through the
/// channel handed to the concrete decoder at construction.
#[async_trait]
pub trait VideoDecoder: Send {
    /// Open `source` and read its stream information.
    ///
    /// Fails for unreadable sources and sources without a video track.
    async fn initialize(&mut self, source: &Path, surface: FrameSurface) -> MediaResult<VideoInfo>;

    async fn start(&mut self) -> MediaResult<()>;

    async fn pause(&mut self) -> MediaResult<()>;

    /// Stop playback and reset the position to zero.
    async fn stop(&mut self) -> MediaResult<()>;

    async fn seek_to(&mut self, position: Duration) -> MediaResult<()>;

    /// Set playback volume, clamped to `[0, 1]`.
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    fn set_looping(&mut self, looping: bool);

    fn state(&self) -> PlaybackState;

    fn position(&self) -> Duration;

    fn video_info(&self) -> Option<&VideoInfo>;

    /// Tear down all resources. Safe to call repeatedly.
    async fn release(&mut self);
}

/// Clamp a requested volume into `[0, 1]`; NaN maps to silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
