//! Talking photo session state machine.
//!
//! ```text
//! Idle -> Detecting -> CacheCheck -> Decoding                                -> Rendering
//!                                 \-> Requesting -> Polling -> Downloading -/
//! ```
//!
//! Each detected poster runs one session: a background pipeline task that
//! resolves the lip video (cache or backend), opens a decoder on the
//! renderer's surface and installs the playback for `render_frame`.
//! Teardown is the single cancellation point for that task.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use tphoto_backend::BackendVideoFetcher;
use tphoto_cache::fs_utils::remove_if_exists;
use tphoto_cache::{sha256_file_async, VideoCache};
use tphoto_media::{DecoderEvent, FormatValidator, PlaybackState, VideoDecoder};
use tphoto_models::{CachedVideo, GenerateRequest, LipCoordinates, VideoInfo};
use tphoto_render::{
    CameraPose, LipRegionRenderer, RenderCoordinator, RenderOutcome, RenderTransform, Viewport,
};
use tphoto_tracking::{Anchor, TrackingEvent};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::SessionLogger;
use crate::metrics;

/// Builds a decoder that publishes on the given channel.
pub type DecoderFactory =
    Arc<dyn Fn(mpsc::UnboundedSender<DecoderEvent>) -> Box<dyn VideoDecoder> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Idle,
    Detecting,
    CacheCheck,
    Requesting,
    Polling,
    Downloading,
    Decoding,
    Rendering,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Detecting => "detecting",
            ControllerState::CacheCheck => "cache_check",
            ControllerState::Requesting => "requesting",
            ControllerState::Polling => "polling",
            ControllerState::Downloading => "downloading",
            ControllerState::Decoding => "decoding",
            ControllerState::Rendering => "rendering",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events published on the controller's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(ControllerState),
    CacheHit {
        poster_id: String,
    },
    CacheMiss {
        poster_id: String,
    },
    Ready {
        poster_id: String,
        info: VideoInfo,
    },
    FirstFrame {
        poster_id: String,
    },
    PlaybackPaused {
        poster_id: String,
    },
    PlaybackResumed {
        poster_id: String,
    },
    /// Non-fatal format problem (low frame rate, A/V drift)
    Warning {
        poster_id: String,
        message: String,
    },
    Error {
        poster_id: Option<String>,
        kind: &'static str,
        message: String,
        user_message: String,
        user_actionable: bool,
    },
    DetectionTimeout {
        user_message: String,
    },
    SessionEnded {
        poster_id: String,
        reason: &'static str,
    },
}

impl ControllerEvent {
    fn error(poster_id: Option<&str>, err: &EngineError) -> Self {
        ControllerEvent::Error {
            poster_id: poster_id.map(str::to_string),
            kind: err.kind(),
            message: err.to_string(),
            user_message: err.user_message(),
            user_actionable: err.is_user_actionable(),
        }
    }
}

/// Result of one `render_frame` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutput {
    pub transform: RenderTransform,
    pub outcome: RenderOutcome,
}

/// Decoder, renderer and transform source of a ready session.
struct Playback {
    poster_id: String,
    anchor: Arc<dyn Anchor>,
    decoder: Box<dyn VideoDecoder>,
    renderer: LipRegionRenderer,
    coordinator: RenderCoordinator,
    forwarder: JoinHandle<()>,
}

impl Playback {
    async fn release(mut self) {
        self.forwarder.abort();
        self.decoder.release().await;
        self.renderer.reset();
    }
}

struct Session {
    poster_id: String,
    logger: SessionLogger,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    paused: Arc<AtomicBool>,
}

struct SessionContext {
    poster_id: String,
    anchor: Arc<dyn Anchor>,
    logger: SessionLogger,
    paused: Arc<AtomicBool>,
}

struct Inner {
    config: EngineConfig,
    cache: Arc<VideoCache>,
    fetcher: Arc<BackendVideoFetcher>,
    decoder_factory: DecoderFactory,
    validator: FormatValidator,
    state_tx: watch::Sender<ControllerState>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    playback: Mutex<Option<Playback>>,
}

impl Inner {
    fn set_state(&self, state: ControllerState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(state = %state, "Controller state changed");
            self.emit(ControllerEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ControllerEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Controller event receiver dropped");
        }
    }
}

/// Orchestrates one talking-photo session at a time.
pub struct TalkingPhotoController {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
}

impl TalkingPhotoController {
    /// Create a controller and the receiving end of its event stream.
    pub fn new(
        config: EngineConfig,
        cache: Arc<VideoCache>,
        fetcher: Arc<BackendVideoFetcher>,
        decoder_factory: DecoderFactory,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (state_tx, _) = watch::channel(ControllerState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            config,
            cache,
            fetcher,
            decoder_factory,
            validator: FormatValidator::default(),
            state_tx,
            events_tx,
            playback: Mutex::new(None),
        };
        let controller = Self {
            inner: Arc::new(inner),
            session: Mutex::new(None),
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> ControllerState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.inner.state_tx.subscribe()
    }

    pub fn cache(&self) -> &Arc<VideoCache> {
        &self.inner.cache
    }

    /// Poster id of the current session, if any.
    pub async fn active_poster(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.poster_id.clone())
    }

    /// End any session and wait for a poster.
    pub async fn begin_detection(&self) {
        let mut session = self.session.lock().await;
        self.teardown_locked(&mut session, "rescan").await;
        self.inner.set_state(ControllerState::Detecting);
    }

    /// Start a session for `poster_id` anchored at `anchor`.
    ///
    /// Any previous session is released first. The pipeline runs in the
    /// background; progress is reported through state and events.
    pub async fn initialize(&self, anchor: Arc<dyn Anchor>, poster_id: &str) -> EngineResult<()> {
        if poster_id.trim().is_empty() {
            return Err(EngineError::config("poster id must not be empty"));
        }

        let mut session = self.session.lock().await;
        if session.is_some() {
            self.teardown_locked(&mut session, "reinitialize").await;
        }

        let logger = SessionLogger::new(Uuid::new_v4(), poster_id);
        logger.log_start("poster detected");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let paused = Arc::new(AtomicBool::new(false));
        let ctx = SessionContext {
            poster_id: poster_id.to_string(),
            anchor,
            logger: logger.clone(),
            paused: Arc::clone(&paused),
        };

        self.inner.set_state(ControllerState::CacheCheck);
        let span = logger.create_span();
        let task = tokio::spawn(run_session(Arc::clone(&self.inner), ctx, cancel_rx).instrument(span));

        *session = Some(Session {
            poster_id: poster_id.to_string(),
            logger,
            cancel_tx,
            task,
            paused,
        });
        Ok(())
    }

    /// React to the tracking engine's event stream.
    pub async fn handle_tracking_event(&self, event: &TrackingEvent) -> EngineResult<()> {
        match event {
            TrackingEvent::PosterDetected { poster_id, anchor } => {
                self.initialize(Arc::clone(anchor), poster_id).await
            }
            TrackingEvent::PosterTracking {
                poster_id,
                extent_x,
                extent_z,
            } => {
                if self.active_poster().await.as_deref() != Some(poster_id.as_str()) {
                    return Ok(());
                }
                if let Some(playback) = self.inner.playback.lock().await.as_mut() {
                    playback.coordinator.set_extents(*extent_x, *extent_z);
                }
                self.resume().await
            }
            TrackingEvent::PosterLost { poster_id, reason } => {
                if self.active_poster().await.as_deref() != Some(poster_id.as_str()) {
                    return Ok(());
                }
                if reason.is_terminal() {
                    self.teardown(reason.as_str()).await;
                    Ok(())
                } else {
                    self.pause().await
                }
            }
            TrackingEvent::DetectionTimeout => {
                let err = EngineError::DetectionTimeout;
                metrics::record_error(err.kind());
                self.inner.emit(ControllerEvent::DetectionTimeout {
                    user_message: err.user_message(),
                });
                Ok(())
            }
        }
    }

    /// Pause playback of the current session (poster temporarily lost).
    pub async fn pause(&self) -> EngineResult<()> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Ok(());
        };
        if session.paused.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(playback) = self.inner.playback.lock().await.as_mut() {
            playback.decoder.pause().await?;
        }
        session.logger.log_progress("playback paused");
        self.inner.emit(ControllerEvent::PlaybackPaused {
            poster_id: session.poster_id.clone(),
        });
        Ok(())
    }

    /// Resume playback after a pause.
    pub async fn resume(&self) -> EngineResult<()> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Ok(());
        };
        if !session.paused.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(playback) = self.inner.playback.lock().await.as_mut() {
            if playback.decoder.state() == PlaybackState::Paused {
                playback.decoder.start().await?;
            }
        }
        session.logger.log_progress("playback resumed");
        self.inner.emit(ControllerEvent::PlaybackResumed {
            poster_id: session.poster_id.clone(),
        });
        Ok(())
    }

    /// Release the session, its pending network work and its playback.
    pub async fn teardown(&self, reason: &'static str) {
        let mut session = self.session.lock().await;
        self.teardown_locked(&mut session, reason).await;
    }

    async fn teardown_locked(&self, slot: &mut Option<Session>, reason: &'static str) {
        let Some(session) = slot.take() else {
            return;
        };

        let _ = session.cancel_tx.send(true);
        if let Err(e) = session.task.await {
            warn!(poster_id = %session.poster_id, error = %e, "Session task failed");
        }

        let playback = self.inner.playback.lock().await.take();
        if let Some(playback) = playback {
            playback.release().await;
        }

        let incoming = self.inner.cache.incoming_path(&session.poster_id);
        if let Err(e) = remove_if_exists(&incoming).await {
            warn!(path = %incoming.display(), error = %e, "Failed to remove partial download");
        }

        session.logger.log_completion(reason);
        self.inner.set_state(ControllerState::Idle);
        self.inner.emit(ControllerEvent::SessionEnded {
            poster_id: session.poster_id,
            reason,
        });
    }

    /// Position and composite the lip overlay for one camera frame.
    ///
    /// Never waits: returns `None` when no playback is installed or the
    /// playback is busy with a transport command.
    pub fn render_frame(
        &self,
        camera: &CameraPose,
        viewport: Viewport,
        poster_image: &mut RgbaImage,
    ) -> Option<FrameOutput> {
        let mut slot = self.inner.playback.try_lock().ok()?;
        let playback = slot.as_mut()?;
        if playback.anchor.is_detached() {
            return None;
        }

        let transform =
            playback
                .coordinator
                .calculate_transform(&playback.anchor.pose(), camera, viewport);
        playback.renderer.set_transform(transform);

        match playback.renderer.render(poster_image) {
            Ok(outcome) => Some(FrameOutput { transform, outcome }),
            Err(e) => {
                warn!(poster_id = %playback.poster_id, error = %e, "Render failed");
                None
            }
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        // Sender dropped: the controller is gone.
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_session(inner: Arc<Inner>, ctx: SessionContext, mut cancel_rx: watch::Receiver<bool>) {
    let result = tokio::select! {
        biased;
        _ = wait_cancelled(&mut cancel_rx) => Err(EngineError::Cancelled),
        result = prepare_playback(&inner, &ctx) => result,
    };

    match result {
        Ok((mut playback, info)) => {
            let mut slot = inner.playback.lock().await;
            if *cancel_rx.borrow() {
                drop(slot);
                playback.release().await;
                return;
            }
            // A pause that arrived while loading found no playback to pause.
            if ctx.paused.load(Ordering::SeqCst) && playback.decoder.state() != PlaybackState::Paused {
                if let Err(e) = playback.decoder.pause().await {
                    warn!(poster_id = %ctx.poster_id, error = %e, "Failed to pause new playback");
                }
            }
            *slot = Some(playback);
            drop(slot);

            metrics::record_ready();
            ctx.logger.log_progress("rendering");
            inner.set_state(ControllerState::Rendering);
            inner.emit(ControllerEvent::Ready {
                poster_id: ctx.poster_id.clone(),
                info,
            });
        }
        Err(EngineError::Cancelled) => {
            debug!(poster_id = %ctx.poster_id, "Session pipeline cancelled");
        }
        Err(e) => {
            let incoming = inner.cache.incoming_path(&ctx.poster_id);
            if let Err(e) = remove_if_exists(&incoming).await {
                warn!(path = %incoming.display(), error = %e, "Failed to remove partial download");
            }

            metrics::record_error(e.kind());
            ctx.logger.log_error(&e.to_string());
            inner.emit(ControllerEvent::error(Some(ctx.poster_id.as_str()), &e));
            inner.set_state(ControllerState::Idle);
        }
    }
}

async fn prepare_playback(inner: &Inner, ctx: &SessionContext) -> EngineResult<(Playback, VideoInfo)> {
    inner.set_state(ControllerState::CacheCheck);

    let video = match inner.cache.retrieve(&ctx.poster_id).await {
        Some(video) => {
            metrics::record_session("cache");
            ctx.logger.log_progress("cache hit");
            inner.emit(ControllerEvent::CacheHit {
                poster_id: ctx.poster_id.clone(),
            });
            video
        }
        None => {
            metrics::record_session("backend");
            ctx.logger.log_progress("cache miss, requesting generation");
            inner.emit(ControllerEvent::CacheMiss {
                poster_id: ctx.poster_id.clone(),
            });
            fetch_and_store(inner, ctx).await?
        }
    };

    inner.set_state(ControllerState::Decoding);
    match start_playback(inner, ctx, &video.video_path, video.lip_coordinates).await {
        Ok(ready) => Ok(ready),
        Err(e @ EngineError::Decode(_)) => {
            // A video that cannot be decoded must be downloaded again next time.
            if inner.cache.invalidate(&ctx.poster_id).await {
                metrics::record_invalidation();
                ctx.logger.log_warning("cached video invalidated after decode failure");
            }
            Err(e)
        }
        Err(e) => Err(e),
    }
}

async fn fetch_and_store(inner: &Inner, ctx: &SessionContext) -> EngineResult<CachedVideo> {
    inner.set_state(ControllerState::Requesting);
    let request = GenerateRequest::new(
        ctx.poster_id.as_str(),
        inner.config.script_text.as_str(),
        inner.config.voice_id.as_str(),
    )?;
    let job_id = inner.fetcher.generate_lip_sync(&request).await?;
    ctx.logger
        .log_progress(&format!("generation job {} submitted", job_id));

    inner.set_state(ControllerState::Polling);
    let status = inner.fetcher.poll_until_complete(&job_id).await?;
    let url = status
        .video_url
        .clone()
        .ok_or_else(|| EngineError::generation_failed("completed job has no videoUrl"))?;
    let lip = status
        .lip_coordinates
        .ok_or_else(|| EngineError::generation_failed("completed job has no lipCoordinates"))?;

    inner.set_state(ControllerState::Downloading);
    let dest = inner.cache.incoming_path(&ctx.poster_id);
    let downloaded = inner.fetcher.download_video(&url, &dest).await?;
    ctx.logger.log_progress(&format!(
        "downloaded {} bytes",
        downloaded.size_bytes
    ));

    let checksum = match status.checksum {
        Some(checksum) => checksum,
        None => {
            ctx.logger
                .log_warning("backend sent no checksum, trusting downloaded content");
            sha256_file_async(&downloaded.path).await?
        }
    };

    // The cache recomputes the digest and refuses a mismatch.
    match inner
        .cache
        .store(&ctx.poster_id, &downloaded.path, lip, &checksum)
        .await
    {
        Ok(video) => Ok(video),
        Err(e) => {
            if let Err(rm) = remove_if_exists(&downloaded.path).await {
                warn!(path = %downloaded.path.display(), error = %rm, "Failed to remove rejected download");
            }
            Err(e.into())
        }
    }
}

async fn start_playback(
    inner: &Inner,
    ctx: &SessionContext,
    path: &Path,
    lip: LipCoordinates,
) -> EngineResult<(Playback, VideoInfo)> {
    let size = inner.config.poster_texture_px;
    let renderer = LipRegionRenderer::new(lip, size, size, inner.config.feather_radius_px)?;

    let (decoder_tx, decoder_rx) = mpsc::unbounded_channel();
    let mut decoder = (inner.decoder_factory)(decoder_tx);

    let info = match decoder.initialize(path, renderer.surface()).await {
        Ok(info) => info,
        Err(e) => {
            decoder.release().await;
            return Err(e.into());
        }
    };

    let report = match inner.validator.ensure_valid(&info) {
        Ok(report) => report,
        Err(e) => {
            decoder.release().await;
            return Err(e.into());
        }
    };
    for warning in report.warnings() {
        inner.emit(ControllerEvent::Warning {
            poster_id: ctx.poster_id.clone(),
            message: warning.to_string(),
        });
    }

    decoder.set_looping(inner.config.looping);
    if let Err(e) = decoder.start().await {
        decoder.release().await;
        return Err(e.into());
    }

    let forwarder = tokio::spawn(forward_decoder_events(
        inner.events_tx.clone(),
        Arc::clone(&inner.cache),
        ctx.poster_id.clone(),
        decoder_rx,
    ));

    let playback = Playback {
        poster_id: ctx.poster_id.clone(),
        anchor: Arc::clone(&ctx.anchor),
        decoder,
        renderer,
        coordinator: RenderCoordinator::new(),
        forwarder,
    };
    Ok((playback, info))
}

async fn forward_decoder_events(
    events: mpsc::UnboundedSender<ControllerEvent>,
    cache: Arc<VideoCache>,
    poster_id: String,
    mut rx: mpsc::UnboundedReceiver<DecoderEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            DecoderEvent::FirstFrameRendered => {
                let _ = events.send(ControllerEvent::FirstFrame {
                    poster_id: poster_id.clone(),
                });
            }
            DecoderEvent::Error(reason) => {
                let err = EngineError::decode(reason);
                warn!(poster_id = %poster_id, error = %err, "Decoder error during playback");
                if cache.invalidate(&poster_id).await {
                    metrics::record_invalidation();
                }
                metrics::record_error(err.kind());
                let _ = events.send(ControllerEvent::error(Some(poster_id.as_str()), &err));
            }
            DecoderEvent::PlaybackStateChanged(state) => {
                debug!(poster_id = %poster_id, state = state.as_str(), "Playback state changed");
            }
            DecoderEvent::VideoSizeChanged { width, height } => {
                debug!(poster_id = %poster_id, width, height, "Video size changed");
            }
            DecoderEvent::Ready(_) => {}
        }
    }
}
