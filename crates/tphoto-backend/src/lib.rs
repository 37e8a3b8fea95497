//! Client for the lip-sync generation backend.
//!
//! The backend is consumed as an opaque job service:
//! - `POST generate` submits a job and returns its id
//! - `GET status/{videoId}` reports progress until a terminal state
//! - the finished asset is downloaded from the returned `videoUrl`
//!
//! [`BackendVideoFetcher`] layers the fixed-interval polling loop and its
//! hard timeout on top of any [`LipSyncBackend`].

pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;

pub use client::{HttpBackend, LipSyncBackend};
pub use config::{BackendConfig, PollConfig};
pub use error::{BackendError, BackendResult};
pub use fetcher::{BackendVideoFetcher, DownloadedVideo};
