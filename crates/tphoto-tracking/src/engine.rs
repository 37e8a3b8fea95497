//! Single-poster tracking state machine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tphoto_models::{Clock, ReferencePoster, TrackingState};

use crate::config::TrackingConfig;
use crate::error::{TrackingError, TrackingResult};
use crate::metrics;
use crate::source::{Anchor, TrackableUpdate, TrackingFrame, TrackingMethod, TrackingSource};

/// Why a tracked poster was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    /// Platform paused tracking; the poster may come back
    Paused,
    /// Platform stopped tracking; the poster is gone
    Stopped,
    /// Cleared by an explicit rescan
    Refresh,
    /// Only last-known-pose updates for longer than the grace period
    OutOfFrame,
}

impl LossReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossReason::Paused => "paused",
            LossReason::Stopped => "stopped",
            LossReason::Refresh => "refresh",
            LossReason::OutOfFrame => "out_of_frame",
        }
    }

    /// Whether the session bound to the poster should be torn down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LossReason::Stopped | LossReason::Refresh)
    }
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events published by [`PosterTrackingEngine`].
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    PosterDetected {
        poster_id: String,
        anchor: Arc<dyn Anchor>,
    },
    PosterTracking {
        poster_id: String,
        extent_x: f32,
        extent_z: f32,
    },
    PosterLost {
        poster_id: String,
        reason: LossReason,
    },
    DetectionTimeout,
}

/// The poster currently being tracked.
#[derive(Debug, Clone)]
pub struct TrackedPoster {
    pub id: String,
    pub display_name: String,
    pub index: usize,
    pub state: TrackingState,
    pub extent_x: f32,
    pub extent_z: f32,
    anchor: Arc<dyn Anchor>,
    last_full_tracking: Instant,
    out_of_frame: bool,
}

impl TrackedPoster {
    pub fn anchor(&self) -> &Arc<dyn Anchor> {
        &self.anchor
    }

    pub fn is_out_of_frame(&self) -> bool {
        self.out_of_frame
    }
}

/// Tracks at most one eligible poster at a time.
///
/// Driven synchronously from the frame callback; never blocks.
pub struct PosterTrackingEngine {
    source: Arc<dyn TrackingSource>,
    clock: Arc<dyn Clock>,
    config: TrackingConfig,
    events: mpsc::UnboundedSender<TrackingEvent>,
    posters: HashMap<String, ReferencePoster>,
    tracked: Option<TrackedPoster>,
    scan_started: Option<Instant>,
    timeout_fired: bool,
}

impl PosterTrackingEngine {
    /// Create an engine and the receiving end of its event stream.
    pub fn new(
        source: Arc<dyn TrackingSource>,
        clock: Arc<dyn Clock>,
        config: TrackingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            source,
            clock,
            config,
            events,
            posters: HashMap::new(),
            tracked: None,
            scan_started: None,
            timeout_fired: false,
        };
        (engine, rx)
    }

    /// Register posters and start scanning.
    ///
    /// Only posters with a human face are kept. Returns the number kept.
    pub fn initialize(&mut self, posters: Vec<ReferencePoster>) -> TrackingResult<usize> {
        self.release();

        let total = posters.len();
        let eligible: Vec<ReferencePoster> = posters.into_iter().filter(|p| p.has_human_face).collect();
        if eligible.is_empty() {
            warn!(total, "No poster with a human face");
            return Err(TrackingError::NoEligiblePosters);
        }

        self.source.register_posters(&eligible)?;

        info!(total, eligible = eligible.len(), "Tracking initialized");
        self.posters = eligible
            .into_iter()
            .map(|p| (p.poster_id.clone(), p))
            .collect();
        self.scan_started = Some(self.clock.now());
        self.timeout_fired = false;
        Ok(self.posters.len())
    }

    pub fn is_initialized(&self) -> bool {
        !self.posters.is_empty()
    }

    pub fn poster(&self, poster_id: &str) -> Option<&ReferencePoster> {
        self.posters.get(poster_id)
    }

    pub fn tracked_poster(&self) -> Option<&TrackedPoster> {
        self.tracked.as_ref()
    }

    /// Handle the trackables updated in one frame.
    pub fn process_frame(&mut self, frame: &TrackingFrame) -> Option<&TrackedPoster> {
        if !self.is_initialized() {
            return None;
        }

        for update in &frame.updates {
            let tracked_id = self.tracked.as_ref().map(|t| t.id.clone());
            match tracked_id {
                // Single-poster mode.
                Some(id) if id != update.name => continue,
                Some(_) => self.update_tracked(update),
                None => self.try_detect(update),
            }
        }

        if self.tracked.is_none() {
            self.check_timeout();
        }
        self.tracked.as_ref()
    }

    /// Fire `DetectionTimeout` once per scanning attempt.
    pub fn check_timeout(&mut self) -> bool {
        if self.timeout_fired || self.tracked.is_some() {
            return false;
        }
        let Some(started) = self.scan_started else {
            return false;
        };
        if self.clock.now().saturating_duration_since(started) < self.config.detection_timeout {
            return false;
        }

        self.timeout_fired = true;
        warn!(
            timeout_secs = self.config.detection_timeout.as_secs(),
            "No poster detected before timeout"
        );
        metrics::record_detection_timeout();
        self.emit(TrackingEvent::DetectionTimeout);
        true
    }

    /// Drop the current poster and start a new scanning attempt.
    pub fn refresh_scan(&mut self) {
        if let Some(tracked) = self.tracked.take() {
            tracked.anchor.detach();
            self.emit_lost(&tracked.id, LossReason::Refresh);
        }
        self.scan_started = Some(self.clock.now());
        self.timeout_fired = false;
        info!("Rescanning for posters");
    }

    /// Detach any anchor and clear all state. Idempotent.
    pub fn release(&mut self) {
        if let Some(tracked) = self.tracked.take() {
            tracked.anchor.detach();
        }
        self.posters.clear();
        self.scan_started = None;
        self.timeout_fired = false;
    }

    fn try_detect(&mut self, update: &TrackableUpdate) {
        if update.state != TrackingState::Tracking || update.method != TrackingMethod::FullTracking {
            return;
        }
        let Some(poster) = self.posters.get(&update.name) else {
            return;
        };

        let anchor = match self.source.create_anchor(update.index, &update.center_pose) {
            Ok(anchor) => anchor,
            Err(e) => {
                warn!(poster_id = %update.name, error = %e, "Anchor creation failed");
                return;
            }
        };

        let tracked = TrackedPoster {
            id: poster.poster_id.clone(),
            display_name: update.name.clone(),
            index: update.index,
            state: TrackingState::Tracking,
            extent_x: update.extent_x,
            extent_z: update.extent_z,
            anchor: Arc::clone(&anchor),
            last_full_tracking: self.clock.now(),
            out_of_frame: false,
        };

        info!(poster_id = %tracked.id, anchor_id = anchor.id(), "Poster detected");
        metrics::record_detection();
        self.emit(TrackingEvent::PosterDetected {
            poster_id: tracked.id.clone(),
            anchor,
        });
        self.tracked = Some(tracked);
    }

    fn update_tracked(&mut self, update: &TrackableUpdate) {
        let now = self.clock.now();
        let grace = self.config.out_of_frame_grace;
        let Some(tracked) = self.tracked.as_mut() else {
            return;
        };

        match update.state {
            TrackingState::Tracking => {
                tracked.extent_x = update.extent_x;
                tracked.extent_z = update.extent_z;
                tracked.state = TrackingState::Tracking;

                if update.method == TrackingMethod::FullTracking {
                    tracked.last_full_tracking = now;
                    tracked.out_of_frame = false;
                } else if !tracked.out_of_frame
                    && now.saturating_duration_since(tracked.last_full_tracking) >= grace
                {
                    tracked.out_of_frame = true;
                    let id = tracked.id.clone();
                    self.emit_lost(&id, LossReason::OutOfFrame);
                    return;
                }

                if !tracked.out_of_frame {
                    debug!(poster_id = %tracked.id, "Poster tracking");
                    let event = TrackingEvent::PosterTracking {
                        poster_id: tracked.id.clone(),
                        extent_x: tracked.extent_x,
                        extent_z: tracked.extent_z,
                    };
                    self.emit(event);
                }
            }
            TrackingState::Paused => {
                if tracked.state != TrackingState::Paused {
                    tracked.state = TrackingState::Paused;
                    let id = tracked.id.clone();
                    self.emit_lost(&id, LossReason::Paused);
                }
            }
            TrackingState::Stopped => {
                if let Some(tracked) = self.tracked.take() {
                    tracked.anchor.detach();
                    self.emit_lost(&tracked.id, LossReason::Stopped);
                }
                // Timer restarts; the timeout latch is cleared only by a refresh.
                self.scan_started = Some(now);
            }
        }
    }

    fn emit_lost(&self, poster_id: &str, reason: LossReason) {
        info!(poster_id = %poster_id, reason = %reason, "Poster lost");
        metrics::record_loss(reason.as_str());
        self.emit(TrackingEvent::PosterLost {
            poster_id: poster_id.to_string(),
            reason,
        });
    }

    fn emit(&self, event: TrackingEvent) {
        if self.events.send(event).is_err() {
            debug!("Tracking event receiver dropped");
        }
    }
}

impl Drop for PosterTrackingEngine {
    fn drop(&mut self) {
        self.release();
    }
}
