//! Video decoding for the lip overlay.
//!
//! This crate provides:
//! - ffprobe-based stream inspection
//! - A decoder abstraction with transport controls and a typed event stream
//! - An ffmpeg rawvideo frame pump writing RGBA frames into a shared surface
//! - Container/codec acceptance checks

pub mod decoder;
pub mod error;
pub mod ffmpeg;
pub mod probe;
pub mod surface;
pub mod validator;

pub use decoder::{DecoderEvent, PlaybackState, VideoDecoder};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::{check_ffmpeg, FfmpegDecoder};
pub use probe::{check_ffprobe, probe_video};
pub use surface::FrameSurface;
pub use validator::{FormatValidator, ValidationIssue, ValidationReport};
