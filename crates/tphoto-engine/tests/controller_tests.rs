//! Session pipeline tests against in-process fakes.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

use tphoto_backend::{BackendResult, BackendVideoFetcher, LipSyncBackend, PollConfig};
use tphoto_cache::{sha256_bytes, CacheConfig, VideoCache};
use tphoto_engine::{
    ControllerEvent, ControllerState, DecoderFactory, EngineConfig, TalkingPhotoController,
};
use tphoto_media::{
    DecoderEvent, FrameSurface, MediaError, MediaResult, PlaybackState, VideoDecoder,
};
use tphoto_models::{
    GenerateRequest, JobId, JobStatus, LipCoordinates, ManualClock, Pose, ReferencePoster,
    StatusResponse, TrackingState, VideoInfo,
};
use tphoto_render::{CameraPose, RenderOutcome, Viewport};
use tphoto_tracking::{
    Anchor, LossReason, PosterTrackingEngine, TrackableUpdate, TrackingConfig, TrackingEvent,
    TrackingFrame, TrackingMethod, TrackingResult, TrackingSource,
};

const GOOD_VIDEO: &[u8] = b"GOOD fake mp4 payload";
const BAD_VIDEO: &[u8] = b"BAD fake mp4 payload";

fn lip() -> LipCoordinates {
    LipCoordinates::new(0.4, 0.6, 0.2, 0.1).unwrap()
}

fn status(state: JobStatus) -> StatusResponse {
    StatusResponse {
        video_id: JobId::from_string("job-1"),
        status: state,
        progress: 0,
        video_url: None,
        lip_coordinates: None,
        checksum: None,
        error_message: None,
    }
}

fn complete(checksum: &str) -> StatusResponse {
    StatusResponse {
        progress: 100,
        video_url: Some("https://cdn.example.com/job-1.mp4".to_string()),
        lip_coordinates: Some(lip()),
        checksum: Some(checksum.to_string()),
        ..status(JobStatus::Complete)
    }
}

/// Backend with scripted statuses and an in-memory asset.
struct FakeBackend {
    statuses: Mutex<VecDeque<StatusResponse>>,
    payload: Vec<u8>,
    /// Block forever once the script is exhausted
    hang: bool,
    submits: AtomicUsize,
    status_calls: AtomicUsize,
    downloads: AtomicUsize,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl FakeBackend {
    fn new(statuses: Vec<StatusResponse>, payload: &[u8]) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            payload: payload.to_vec(),
            hang: false,
            submits: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(Vec::new(), GOOD_VIDEO)
        }
    }
}

#[async_trait]
impl LipSyncBackend for FakeBackend {
    async fn submit(&self, request: &GenerateRequest) -> BackendResult<JobId> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(JobId::from_string("job-1"))
    }

    async fn status(&self, _job_id: &JobId) -> BackendResult<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(status) => Ok(status),
            None if self.hang => std::future::pending().await,
            None => Ok(status(JobStatus::Processing)),
        }
    }

    async fn download(&self, _url: &str, dest: &Path) -> BackendResult<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, &self.payload).await?;
        Ok(self.payload.len() as u64)
    }
}

/// Decoder that accepts any file not starting with `BAD`.
struct FakeDecoder {
    events: mpsc::UnboundedSender<DecoderEvent>,
    calls: Arc<Mutex<Vec<&'static str>>>,
    /// When armed, the next `start` waits for a notification
    start_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    surface: Option<FrameSurface>,
    info: Option<VideoInfo>,
    state: PlaybackState,
    volume: f32,
    looping: bool,
}

fn video_info() -> VideoInfo {
    VideoInfo {
        width: 320,
        height: 240,
        duration_ms: 4_000,
        frame_rate_fps: 30.0,
        codec: "h264".to_string(),
        has_video_track: true,
        has_audio_track: true,
        container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        profile: Some("Constrained Baseline".to_string()),
        av_drift_ms: Some(0.0),
    }
}

#[async_trait]
impl VideoDecoder for FakeDecoder {
    async fn initialize(&mut self, source: &Path, surface: FrameSurface) -> MediaResult<VideoInfo> {
        self.calls.lock().unwrap().push("initialize");
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|_| MediaError::FileNotFound(source.to_path_buf()))?;
        if bytes.starts_with(b"BAD") {
            return Err(MediaError::invalid_video("corrupt stream"));
        }
        let info = video_info();
        self.surface = Some(surface);
        self.info = Some(info.clone());
        self.state = PlaybackState::Ready;
        let _ = self.events.send(DecoderEvent::Ready(info.clone()));
        Ok(info)
    }

    async fn start(&mut self) -> MediaResult<()> {
        let gate = self.start_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.calls.lock().unwrap().push("start");
        let surface = self
            .surface
            .as_ref()
            .ok_or(MediaError::NotInitialized)?;
        if surface.present(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))) == 1 {
            let _ = self.events.send(DecoderEvent::FirstFrameRendered);
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    async fn pause(&mut self) -> MediaResult<()> {
        self.calls.lock().unwrap().push("pause");
        self.state = PlaybackState::Paused;
        Ok(())
    }

    async fn stop(&mut self) -> MediaResult<()> {
        self.calls.lock().unwrap().push("stop");
        self.state = PlaybackState::Stopped;
        Ok(())
    }

    async fn seek_to(&mut self, _position: Duration) -> MediaResult<()> {
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn video_info(&self) -> Option<&VideoInfo> {
        self.info.as_ref()
    }

    async fn release(&mut self) {
        self.calls.lock().unwrap().push("release");
        self.surface = None;
        self.state = PlaybackState::Idle;
    }
}

#[derive(Debug)]
struct FixedAnchor {
    pose: Pose,
}

impl Anchor for FixedAnchor {
    fn id(&self) -> u64 {
        1
    }
    fn pose(&self) -> Pose {
        self.pose
    }
    fn detach(&self) {}
    fn is_detached(&self) -> bool {
        false
    }
}

fn anchor() -> Arc<dyn Anchor> {
    Arc::new(FixedAnchor {
        pose: Pose::from_translation(0.0, 0.0, -2.0),
    })
}

#[derive(Debug)]
struct SceneAnchor {
    id: u64,
    pose: Pose,
    detached: AtomicBool,
}

impl Anchor for SceneAnchor {
    fn id(&self) -> u64 {
        self.id
    }
    fn pose(&self) -> Pose {
        self.pose
    }
    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

/// Tracking platform that anchors wherever it is told.
#[derive(Default)]
struct SceneSource {
    next_id: AtomicU64,
}

impl TrackingSource for SceneSource {
    fn register_posters(&self, _posters: &[ReferencePoster]) -> TrackingResult<()> {
        Ok(())
    }

    fn create_anchor(&self, _index: usize, pose: &Pose) -> TrackingResult<Arc<dyn Anchor>> {
        Ok(Arc::new(SceneAnchor {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            pose: *pose,
            detached: AtomicBool::new(false),
        }))
    }
}

fn reference(poster_id: &str) -> ReferencePoster {
    ReferencePoster::new(poster_id, true, lip(), format!("{}.jpg", poster_id), Some(0.6)).unwrap()
}

fn sighting(index: usize, poster_id: &str) -> TrackingFrame {
    TrackingFrame::new(vec![TrackableUpdate {
        index,
        name: poster_id.to_string(),
        state: TrackingState::Tracking,
        method: TrackingMethod::FullTracking,
        center_pose: Pose::from_translation(0.0, 0.0, -2.0),
        extent_x: 0.6,
        extent_z: 0.9,
    }])
}

/// Hand every pending tracking event to the controller, as the frame loop does.
async fn forward_tracking(
    events: &mut mpsc::UnboundedReceiver<TrackingEvent>,
    controller: &TalkingPhotoController,
) {
    while let Ok(event) = events.try_recv() {
        controller.handle_tracking_event(&event).await.unwrap();
    }
}

struct Harness {
    controller: TalkingPhotoController,
    events: mpsc::UnboundedReceiver<ControllerEvent>,
    backend: Arc<FakeBackend>,
    cache: Arc<VideoCache>,
    decoder_calls: Arc<Mutex<Vec<&'static str>>>,
    start_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    _dir: TempDir,
}

async fn harness(backend: FakeBackend) -> Harness {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let cache = Arc::new(
        VideoCache::open(CacheConfig::new(dir.path().join("cache")), Arc::new(clock.clone()))
            .await
            .unwrap(),
    );
    let backend = Arc::new(backend);
    let fetcher = Arc::new(BackendVideoFetcher::new(
        backend.clone(),
        Arc::new(clock),
        PollConfig::default(),
    ));

    let decoder_calls = Arc::new(Mutex::new(Vec::new()));
    let calls = decoder_calls.clone();
    let start_gate = Arc::new(Mutex::new(None));
    let gate = start_gate.clone();
    let factory: DecoderFactory = Arc::new(move |events| {
        Box::new(FakeDecoder {
            events,
            calls: calls.clone(),
            start_gate: gate.clone(),
            surface: None,
            info: None,
            state: PlaybackState::Idle,
            volume: 1.0,
            looping: false,
        }) as Box<dyn VideoDecoder>
    });

    let (controller, events) =
        TalkingPhotoController::new(EngineConfig::default(), cache.clone(), fetcher, factory);
    Harness {
        controller,
        events,
        backend,
        cache,
        decoder_calls,
        start_gate,
        _dir: dir,
    }
}

/// Collect events up to and including the first one matching `pred`.
async fn events_until(
    events: &mut mpsc::UnboundedReceiver<ControllerEvent>,
    pred: impl Fn(&ControllerEvent) -> bool,
) -> Vec<ControllerEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for controller event")
            .expect("controller event channel closed");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn is_ready(event: &ControllerEvent) -> bool {
    matches!(event, ControllerEvent::Ready { .. })
}

fn is_error(event: &ControllerEvent) -> bool {
    matches!(event, ControllerEvent::Error { .. })
}

async fn seed_cache(cache: &VideoCache, poster_id: &str, payload: &[u8]) {
    let staging = TempDir::new().unwrap();
    let source = staging.path().join("seed.mp4");
    tokio::fs::write(&source, payload).await.unwrap();
    cache
        .store(poster_id, &source, lip(), &sha256_bytes(payload))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cache_miss_generates_downloads_and_stores() {
    let checksum = sha256_bytes(GOOD_VIDEO);
    let mut h = harness(FakeBackend::new(
        vec![
            status(JobStatus::Pending),
            status(JobStatus::Processing),
            complete(&checksum),
        ],
        GOOD_VIDEO,
    ))
    .await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    let seen = events_until(&mut h.events, is_ready).await;

    assert!(seen.contains(&ControllerEvent::CacheMiss {
        poster_id: "poster-1".to_string()
    }));
    for state in [
        ControllerState::Requesting,
        ControllerState::Polling,
        ControllerState::Downloading,
        ControllerState::Decoding,
        ControllerState::Rendering,
    ] {
        assert!(
            seen.contains(&ControllerEvent::StateChanged(state)),
            "missing state {}",
            state
        );
    }
    assert_eq!(h.controller.state(), ControllerState::Rendering);

    assert_eq!(h.backend.submits.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.backend.downloads.load(Ordering::SeqCst), 1);
    let request = h.backend.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.poster_id, "poster-1");

    let cached = h.cache.retrieve("poster-1").await.unwrap();
    assert_eq!(cached.checksum, checksum);
    assert_eq!(cached.lip_coordinates, lip());
    assert!(!h.cache.incoming_path("poster-1").exists());

    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "start"]);
}

#[tokio::test]
async fn test_cache_hit_skips_backend() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    seed_cache(&h.cache, "poster-1", GOOD_VIDEO).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    let seen = events_until(&mut h.events, is_ready).await;

    assert!(seen.contains(&ControllerEvent::CacheHit {
        poster_id: "poster-1".to_string()
    }));
    assert!(!seen.contains(&ControllerEvent::StateChanged(ControllerState::Requesting)));
    assert_eq!(h.backend.submits.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_render_frame_composites_after_ready() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    seed_cache(&h.cache, "poster-1", GOOD_VIDEO).await;

    let camera = CameraPose::from_world_pose(
        &Pose::identity(),
        16.0 / 9.0,
        std::f32::consts::FRAC_PI_3,
        0.1,
        100.0,
    );
    let viewport = Viewport::new(1920.0, 1080.0);
    let mut poster = RgbaImage::from_pixel(1000, 1000, Rgba([0, 0, 0, 255]));

    assert!(h
        .controller
        .render_frame(&camera, viewport, &mut poster)
        .is_none());

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    events_until(&mut h.events, is_ready).await;

    let output = h
        .controller
        .render_frame(&camera, viewport, &mut poster)
        .unwrap();
    assert!(output.transform.is_visible);
    assert!((output.transform.screen_position.x - 960.0).abs() < 0.5);
    assert!(matches!(output.outcome, RenderOutcome::Composited { pixels, .. } if pixels > 0));
    assert_eq!(*poster.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    assert_eq!(*poster.get_pixel(500, 650), Rgba([255, 0, 0, 255]));
}

#[tokio::test]
async fn test_teardown_mid_poll_cancels_and_accepts_new_poster() {
    let mut h = harness(FakeBackend::hanging()).await;
    seed_cache(&h.cache, "poster-2", GOOD_VIDEO).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    events_until(&mut h.events, |e| {
        *e == ControllerEvent::StateChanged(ControllerState::Polling)
    })
    .await;

    h.controller.teardown(LossReason::Refresh.as_str()).await;
    let seen = events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::SessionEnded { .. })
    })
    .await;

    assert!(!seen.iter().any(is_error));
    assert_eq!(
        seen.last(),
        Some(&ControllerEvent::SessionEnded {
            poster_id: "poster-1".to_string(),
            reason: LossReason::Refresh.as_str(),
        })
    );
    assert_eq!(h.controller.state(), ControllerState::Idle);
    assert_eq!(h.controller.active_poster().await, None);
    assert_eq!(h.backend.downloads.load(Ordering::SeqCst), 0);
    assert!(!h.cache.contains("poster-1").await);
    assert!(!h.cache.incoming_path("poster-1").exists());

    h.controller.initialize(anchor(), "poster-2").await.unwrap();
    let seen = events_until(&mut h.events, is_ready).await;
    assert!(!seen.iter().any(is_error));
    assert_eq!(h.controller.active_poster().await.as_deref(), Some("poster-2"));
}

#[tokio::test]
async fn test_checksum_mismatch_discards_download() {
    let wrong = "0".repeat(64);
    let mut h = harness(FakeBackend::new(vec![complete(&wrong)], GOOD_VIDEO)).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    let seen = events_until(&mut h.events, is_error).await;

    match seen.last() {
        Some(ControllerEvent::Error { kind, poster_id, .. }) => {
            assert_eq!(*kind, "checksum_mismatch");
            assert_eq!(poster_id.as_deref(), Some("poster-1"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    events_until(&mut h.events, |e| {
        *e == ControllerEvent::StateChanged(ControllerState::Idle)
    })
    .await;

    assert!(!h.cache.contains("poster-1").await);
    assert!(!h.cache.incoming_path("poster-1").exists());
    assert!(h.decoder_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_generation_failure_reported() {
    let mut failed = status(JobStatus::Failed);
    failed.error_message = Some("no face found".to_string());
    let mut h = harness(FakeBackend::new(vec![status(JobStatus::Processing), failed], GOOD_VIDEO)).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    let seen = events_until(&mut h.events, is_error).await;

    match seen.last() {
        Some(ControllerEvent::Error {
            kind,
            message,
            user_actionable,
            ..
        }) => {
            assert_eq!(*kind, "generation_failed");
            assert!(message.contains("no face found"));
            assert!(!user_actionable);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.backend.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_decode_failure_invalidates_cache_entry() {
    let checksum = sha256_bytes(BAD_VIDEO);
    let mut h = harness(FakeBackend::new(vec![complete(&checksum)], BAD_VIDEO)).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    let seen = events_until(&mut h.events, is_error).await;

    assert!(matches!(
        seen.last(),
        Some(ControllerEvent::Error { kind: "decode", .. })
    ));
    assert!(!h.cache.contains("poster-1").await);
    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "release"]);
}

#[tokio::test]
async fn test_tracking_events_pause_resume_and_stop() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    seed_cache(&h.cache, "poster-1", GOOD_VIDEO).await;

    h.controller
        .handle_tracking_event(&TrackingEvent::PosterDetected {
            poster_id: "poster-1".to_string(),
            anchor: anchor(),
        })
        .await
        .unwrap();
    events_until(&mut h.events, is_ready).await;

    let lost = TrackingEvent::PosterLost {
        poster_id: "poster-1".to_string(),
        reason: LossReason::OutOfFrame,
    };
    h.controller.handle_tracking_event(&lost).await.unwrap();
    // Second loss while paused is a no-op.
    h.controller.handle_tracking_event(&lost).await.unwrap();
    events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::PlaybackPaused { .. })
    })
    .await;
    assert_eq!(h.controller.state(), ControllerState::Rendering);

    h.controller
        .handle_tracking_event(&TrackingEvent::PosterTracking {
            poster_id: "poster-1".to_string(),
            extent_x: 0.6,
            extent_z: 0.9,
        })
        .await
        .unwrap();
    let seen = events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::PlaybackResumed { .. })
    })
    .await;
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ControllerEvent::PlaybackPaused { .. })));

    h.controller
        .handle_tracking_event(&TrackingEvent::PosterLost {
            poster_id: "poster-1".to_string(),
            reason: LossReason::Stopped,
        })
        .await
        .unwrap();
    events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::SessionEnded { .. })
    })
    .await;

    assert_eq!(h.controller.state(), ControllerState::Idle);
    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "start", "pause", "start", "release"]);
}

#[tokio::test]
async fn test_events_for_other_posters_ignored() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    seed_cache(&h.cache, "poster-1", GOOD_VIDEO).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    events_until(&mut h.events, is_ready).await;

    h.controller
        .handle_tracking_event(&TrackingEvent::PosterLost {
            poster_id: "poster-9".to_string(),
            reason: LossReason::Stopped,
        })
        .await
        .unwrap();

    assert_eq!(h.controller.state(), ControllerState::Rendering);
    assert_eq!(h.controller.active_poster().await.as_deref(), Some("poster-1"));
}

#[tokio::test]
async fn test_reinitialize_releases_previous_session() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    seed_cache(&h.cache, "poster-1", GOOD_VIDEO).await;
    seed_cache(&h.cache, "poster-2", GOOD_VIDEO).await;

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    events_until(&mut h.events, is_ready).await;

    h.controller.initialize(anchor(), "poster-2").await.unwrap();
    let seen = events_until(&mut h.events, is_ready).await;

    assert!(seen.contains(&ControllerEvent::SessionEnded {
        poster_id: "poster-1".to_string(),
        reason: "reinitialize",
    }));
    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "start", "release", "initialize", "start"]);
}

#[tokio::test]
async fn test_detection_timeout_surfaces_message() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;

    h.controller.begin_detection().await;
    assert_eq!(h.controller.state(), ControllerState::Detecting);

    h.controller
        .handle_tracking_event(&TrackingEvent::DetectionTimeout)
        .await
        .unwrap();
    let seen = events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::DetectionTimeout { .. })
    })
    .await;

    match seen.last() {
        Some(ControllerEvent::DetectionTimeout { user_message }) => {
            assert!(user_message.contains("Point your camera"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_poster_id_rejected() {
    let h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    assert!(h.controller.initialize(anchor(), "  ").await.is_err());
    assert_eq!(h.controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_refresh_during_generation_then_detect_cached_poster() {
    let mut h = harness(FakeBackend::hanging()).await;
    seed_cache(&h.cache, "ad-7", GOOD_VIDEO).await;

    let (mut tracker, mut tracking) = PosterTrackingEngine::new(
        Arc::new(SceneSource::default()),
        Arc::new(ManualClock::new()),
        TrackingConfig::default(),
    );
    tracker
        .initialize(vec![reference("ad-42"), reference("ad-7")])
        .unwrap();

    assert!(tracker.process_frame(&sighting(0, "ad-42")).is_some());
    forward_tracking(&mut tracking, &h.controller).await;
    events_until(&mut h.events, |e| {
        *e == ControllerEvent::StateChanged(ControllerState::Polling)
    })
    .await;

    tracker.refresh_scan();
    forward_tracking(&mut tracking, &h.controller).await;
    let seen = events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::SessionEnded { .. })
    })
    .await;

    assert!(!seen.iter().any(is_error));
    assert_eq!(
        seen.last(),
        Some(&ControllerEvent::SessionEnded {
            poster_id: "ad-42".to_string(),
            reason: "refresh",
        })
    );
    assert_eq!(h.controller.active_poster().await, None);
    assert_eq!(h.controller.state(), ControllerState::Idle);
    assert!(tracker.tracked_poster().is_none());

    assert!(tracker.process_frame(&sighting(1, "ad-7")).is_some());
    forward_tracking(&mut tracking, &h.controller).await;
    let seen = events_until(&mut h.events, is_ready).await;

    assert!(!seen.iter().any(is_error));
    assert!(seen.contains(&ControllerEvent::CacheHit {
        poster_id: "ad-7".to_string()
    }));
    assert_eq!(h.controller.active_poster().await.as_deref(), Some("ad-7"));
    assert_eq!(h.backend.submits.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.downloads.load(Ordering::SeqCst), 0);
    assert!(!h.cache.contains("ad-42").await);
}

#[tokio::test]
async fn test_second_sighting_of_generated_poster_plays_from_cache() {
    let checksum = sha256_bytes(GOOD_VIDEO);
    let mut h = harness(FakeBackend::new(
        vec![
            status(JobStatus::Pending),
            status(JobStatus::Processing),
            complete(&checksum),
        ],
        GOOD_VIDEO,
    ))
    .await;

    h.controller.initialize(anchor(), "ad-42").await.unwrap();
    let seen = events_until(&mut h.events, is_ready).await;
    assert!(seen.contains(&ControllerEvent::CacheMiss {
        poster_id: "ad-42".to_string()
    }));

    h.controller
        .handle_tracking_event(&TrackingEvent::PosterLost {
            poster_id: "ad-42".to_string(),
            reason: LossReason::Stopped,
        })
        .await
        .unwrap();
    events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::SessionEnded { .. })
    })
    .await;

    h.controller
        .handle_tracking_event(&TrackingEvent::PosterDetected {
            poster_id: "ad-42".to_string(),
            anchor: anchor(),
        })
        .await
        .unwrap();
    let seen = events_until(&mut h.events, is_ready).await;

    assert!(seen.contains(&ControllerEvent::CacheHit {
        poster_id: "ad-42".to_string()
    }));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ControllerEvent::CacheMiss { .. })));
    assert_eq!(h.backend.submits.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.backend.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.retrieve("ad-42").await.unwrap().checksum, checksum);

    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "start", "release", "initialize", "start"]);
}

#[tokio::test]
async fn test_pause_while_loading_applies_once_playback_ready() {
    let mut h = harness(FakeBackend::new(Vec::new(), GOOD_VIDEO)).await;
    seed_cache(&h.cache, "poster-1", GOOD_VIDEO).await;
    let gate = Arc::new(Notify::new());
    *h.start_gate.lock().unwrap() = Some(gate.clone());

    h.controller.initialize(anchor(), "poster-1").await.unwrap();
    events_until(&mut h.events, |e| {
        *e == ControllerEvent::StateChanged(ControllerState::Decoding)
    })
    .await;

    // No playback is installed yet while start is held.
    h.controller.pause().await.unwrap();
    events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::PlaybackPaused { .. })
    })
    .await;
    gate.notify_one();
    events_until(&mut h.events, is_ready).await;

    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "start", "pause"]);

    h.controller.resume().await.unwrap();
    events_until(&mut h.events, |e| {
        matches!(e, ControllerEvent::PlaybackResumed { .. })
    })
    .await;
    let calls = h.decoder_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["initialize", "start", "pause", "start"]);
}
