//! Poster tracking on top of an AR platform.
//!
//! The platform is reached only through [`TrackingSource`] and [`Anchor`].
//! [`PosterTrackingEngine`] turns per-frame trackable updates into a typed
//! [`TrackingEvent`] stream with at most one tracked poster at a time.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod source;

pub use config::TrackingConfig;
pub use engine::{LossReason, PosterTrackingEngine, TrackedPoster, TrackingEvent};
pub use error::{TrackingError, TrackingResult};
pub use source::{Anchor, TrackableUpdate, TrackingFrame, TrackingMethod, TrackingSource};
