//! Shared data models for the talking photo engine.
//!
//! This crate provides Serde-serializable types for:
//! - Normalized lip regions and their pixel projections
//! - Reference posters and tracking state
//! - Cached video records and decoder output
//! - Backend generation jobs and status polling
//! - A clock abstraction for deterministic timing

pub mod clock;
pub mod error;
pub mod job;
pub mod lip;
pub mod pose;
pub mod poster;
pub mod video;

// Re-export common types
pub use clock::{Clock, ManualClock, TokioClock};
pub use error::{ModelError, ModelResult};
pub use job::{GenerateRequest, GenerateResponse, JobId, JobStatus, StatusResponse};
pub use lip::{LipCoordinates, PixelRect};
pub use pose::Pose;
pub use poster::{ReferencePoster, TrackingState};
pub use video::{CachedVideo, VideoInfo};
