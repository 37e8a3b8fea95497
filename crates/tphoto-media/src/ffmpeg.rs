//! FFmpeg-backed decoder.
//!
//! Frames are produced by `ffmpeg ... -f rawvideo -pix_fmt rgba -` and paced
//! at the stream frame rate into a [`FrameSurface`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tphoto_models::VideoInfo;

use crate::decoder::{clamp_volume, DecoderEvent, PlaybackState, VideoDecoder};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, MAX_FRAME_RATE};
use crate::surface::FrameSurface;

/// Frame rate assumed when the stream does not report one.
const FALLBACK_FPS: f64 = 30.0;

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Arguments for a rawvideo RGBA pump starting at `position`.
pub fn frame_pump_args(source: &Path, position: Duration) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-nostdin".to_string(),
        "-ss".to_string(),
        format!("{:.3}", position.as_secs_f64()),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-an".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-".to_string(),
    ]
}

/// State shared between the decoder and its pump task.
#[derive(Debug, Default)]
struct PumpShared {
    position_ms: AtomicU64,
    ended: AtomicBool,
    first_frame_sent: AtomicBool,
}

struct FramePump {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct PumpJob {
    source: PathBuf,
    info: VideoInfo,
    surface: FrameSurface,
    looping: bool,
    shared: Arc<PumpShared>,
    events: mpsc::UnboundedSender<DecoderEvent>,
}

/// Decoder driving an `ffmpeg` child process.
pub struct FfmpegDecoder {
    events: mpsc::UnboundedSender<DecoderEvent>,
    source: Option<PathBuf>,
    surface: Option<FrameSurface>,
    info: Option<VideoInfo>,
    state: PlaybackState,
    volume: f32,
    looping: bool,
    shared: Arc<PumpShared>,
    pump: Option<FramePump>,
}

impl FfmpegDecoder {
    pub fn new(events: mpsc::UnboundedSender<DecoderEvent>) -> Self {
        Self {
            events,
            source: None,
            surface: None,
            info: None,
            state: PlaybackState::Idle,
            volume: 1.0,
            looping: true,
            shared: Arc::new(PumpShared::default()),
            pump: None,
        }
    }

    fn emit(&self, event: DecoderEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.emit(DecoderEvent::PlaybackStateChanged(state));
        }
    }

    fn position_duration(&self) -> Duration {
        Duration::from_millis(self.shared.position_ms.load(Ordering::Relaxed))
    }

    fn spawn_pump(&mut self) -> MediaResult<()> {
        let (source, info, surface) = match (&self.source, &self.info, &self.surface) {
            (Some(s), Some(i), Some(f)) => (s.clone(), i.clone(), f.clone()),
            _ => return Err(MediaError::NotInitialized),
        };
        check_ffmpeg()?;

        self.shared.ended.store(false, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let job = PumpJob {
            source,
            info,
            surface,
            looping: self.looping,
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
        };
        let handle = tokio::spawn(run_pump(job, cancel_rx));
        self.pump = Some(FramePump { cancel_tx, handle });
        Ok(())
    }

    async fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            let _ = pump.cancel_tx.send(true);
            if let Err(e) = pump.handle.await {
                warn!(error = %e, "Frame pump task failed");
            }
        }
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn initialize(&mut self, source: &Path, surface: FrameSurface) -> MediaResult<VideoInfo> {
        self.release().await;

        let info = probe_video(source).await?;
        if !info.has_video_track {
            let err = MediaError::invalid_video("no video track");
            self.emit(DecoderEvent::Error(err.to_string()));
            return Err(err);
        }
        if info.width == 0 || info.height == 0 {
            let err = MediaError::invalid_video(format!("bad dimensions {}x{}", info.width, info.height));
            self.emit(DecoderEvent::Error(err.to_string()));
            return Err(err);
        }

        info!(
            source = %source.display(),
            width = info.width,
            height = info.height,
            duration_ms = info.duration_ms,
            "Decoder ready"
        );

        self.source = Some(source.to_path_buf());
        self.surface = Some(surface);
        self.info = Some(info.clone());
        self.shared = Arc::new(PumpShared::default());
        self.emit(DecoderEvent::VideoSizeChanged {
            width: info.width,
            height: info.height,
        });
        self.emit(DecoderEvent::Ready(info.clone()));
        self.set_state(PlaybackState::Ready);
        Ok(info)
    }

    async fn start(&mut self) -> MediaResult<()> {
        if self.info.is_none() {
            return Err(MediaError::NotInitialized);
        }
        if self.state == PlaybackState::Playing && !self.shared.ended.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.stop_pump().await;
        if self.shared.ended.load(Ordering::Relaxed) {
            self.shared.position_ms.store(0, Ordering::Relaxed);
        }
        self.spawn_pump()?;
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    async fn pause(&mut self) -> MediaResult<()> {
        if self.info.is_none() {
            return Err(MediaError::NotInitialized);
        }
        self.stop_pump().await;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    async fn stop(&mut self) -> MediaResult<()> {
        if self.info.is_none() {
            return Err(MediaError::NotInitialized);
        }
        self.stop_pump().await;
        self.shared.position_ms.store(0, Ordering::Relaxed);
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    async fn seek_to(&mut self, position: Duration) -> MediaResult<()> {
        let duration_ms = match &self.info {
            Some(info) => info.duration_ms,
            None => return Err(MediaError::NotInitialized),
        };
        let target = (position.as_millis() as u64).min(duration_ms);
        let was_playing = self.pump.is_some();

        self.stop_pump().await;
        self.shared.position_ms.store(target, Ordering::Relaxed);
        debug!(position_ms = target, "Seek");
        if was_playing {
            self.spawn_pump()?;
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn state(&self) -> PlaybackState {
        if self.state == PlaybackState::Playing && self.shared.ended.load(Ordering::Relaxed) {
            PlaybackState::Ended
        } else {
            self.state
        }
    }

    fn position(&self) -> Duration {
        self.position_duration()
    }

    fn video_info(&self) -> Option<&VideoInfo> {
        self.info.as_ref()
    }

    async fn release(&mut self) {
        self.stop_pump().await;
        self.source = None;
        self.surface = None;
        self.info = None;
        self.shared.position_ms.store(0, Ordering::Relaxed);
        self.shared.ended.store(false, Ordering::Relaxed);
        self.state = PlaybackState::Idle;
    }
}

/// Pacing interval for a reported frame rate, never shorter than 1 ms.
fn frame_interval(reported_fps: f64) -> Duration {
    let fps = if reported_fps.is_finite() && reported_fps > 0.0 && reported_fps <= MAX_FRAME_RATE {
        reported_fps
    } else {
        FALLBACK_FPS
    };
    Duration::from_secs_f64(1.0 / fps).max(Duration::from_millis(1))
}

async fn run_pump(job: PumpJob, mut cancel_rx: watch::Receiver<bool>) {
    let frame_interval = frame_interval(job.info.frame_rate_fps);
    let frame_len = job.info.rgba_frame_len();

    loop {
        let start_at = Duration::from_millis(job.shared.position_ms.load(Ordering::Relaxed));
        let mut child = match Command::new("ffmpeg")
            .args(frame_pump_args(&job.source, start_at))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = job.events.send(DecoderEvent::Error(format!("failed to spawn ffmpeg: {}", e)));
                return;
            }
        };

        let Some(mut stdout) = child.stdout.take() else {
            let _ = job.events.send(DecoderEvent::Error("ffmpeg stdout not captured".to_string()));
            return;
        };

        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; frame_len];
        let mut frames: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    let _ = child.kill().await;
                    return;
                }
                read = stdout.read_exact(&mut buf) => match read {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => {
                        let _ = child.kill().await;
                        let _ = job.events.send(DecoderEvent::Error(format!("frame read failed: {}", e)));
                        return;
                    }
                },
            }

            tokio::select! {
                _ = cancel_rx.changed() => {
                    let _ = child.kill().await;
                    return;
                }
                _ = ticker.tick() => {}
            }

            let Some(frame) = RgbaImage::from_raw(job.info.width, job.info.height, buf.clone()) else {
                let _ = job.events.send(DecoderEvent::Error("frame buffer size mismatch".to_string()));
                return;
            };
            job.surface.present(frame);
            frames += 1;

            if !job.shared.first_frame_sent.swap(true, Ordering::Relaxed) {
                let _ = job.events.send(DecoderEvent::FirstFrameRendered);
            }

            let position = start_at + frame_interval.mul_f64(frames as f64);
            job.shared
                .position_ms
                .store(position.as_millis() as u64, Ordering::Relaxed);
        }

        match child.wait().await {
            Ok(status) if !status.success() && frames == 0 => {
                let _ = job.events.send(DecoderEvent::Error(format!("ffmpeg exited with {}", status)));
                return;
            }
            Err(e) => {
                let _ = job.events.send(DecoderEvent::Error(format!("ffmpeg wait failed: {}", e)));
                return;
            }
            _ => {}
        }

        if job.looping && frames > 0 {
            job.shared.position_ms.store(0, Ordering::Relaxed);
            continue;
        }

        job.shared.ended.store(true, Ordering::Relaxed);
        let _ = job
            .events
            .send(DecoderEvent::PlaybackStateChanged(PlaybackState::Ended));
        return;
    }
}
