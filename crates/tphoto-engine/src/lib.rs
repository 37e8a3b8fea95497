//! Talking photo session orchestration.
//!
//! This crate provides:
//! - [`TalkingPhotoController`], the per-poster pipeline from cache lookup
//!   or backend generation to decoding and rendering
//! - Engine configuration loaded from `TPHOTO_*` environment variables
//! - Structured session logging

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::EngineConfig;
pub use controller::{
    ControllerEvent, ControllerState, DecoderFactory, FrameOutput, TalkingPhotoController,
};
pub use error::{EngineError, EngineResult};
pub use logging::{init_tracing, SessionLogger};
