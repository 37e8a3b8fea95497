//! AR platform boundary.

use std::fmt::Debug;
use std::sync::Arc;

use tphoto_models::{Pose, ReferencePoster, TrackingState};

use crate::error::TrackingResult;

/// How the platform produced the pose of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMethod {
    /// The image is currently visible to the camera
    FullTracking,
    /// The image left the camera view; the pose is extrapolated
    LastKnownPose,
}

/// One updated trackable in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackableUpdate {
    /// Stable platform index of the trackable
    pub index: usize,
    /// Reference image name, equal to the poster id
    pub name: String,
    pub state: TrackingState,
    pub method: TrackingMethod,
    pub center_pose: Pose,
    /// Physical width in meters
    pub extent_x: f32,
    /// Physical height in meters
    pub extent_z: f32,
}

/// Trackables updated since the previous frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingFrame {
    pub updates: Vec<TrackableUpdate>,
}

impl TrackingFrame {
    pub fn new(updates: Vec<TrackableUpdate>) -> Self {
        Self { updates }
    }
}

/// A platform handle keeping content locked to a tracked pose.
pub trait Anchor: Debug + Send + Sync {
    /// Identity of the anchor; stable for its lifetime.
    fn id(&self) -> u64;

    fn pose(&self) -> Pose;

    /// Stop tracking and release platform resources. Idempotent.
    fn detach(&self);

    fn is_detached(&self) -> bool;
}

/// The AR tracking capability.
pub trait TrackingSource: Send + Sync {
    /// Load reference images into the platform's image database.
    fn register_posters(&self, posters: &[ReferencePoster]) -> TrackingResult<()>;

    /// Create an anchor on trackable `index` at `pose`.
    fn create_anchor(&self, index: usize, pose: &Pose) -> TrackingResult<Arc<dyn Anchor>>;
}
