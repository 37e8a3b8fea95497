//! Engine configuration.

use tphoto_backend::{BackendConfig, PollConfig};
use tphoto_cache::CacheConfig;
use tphoto_tracking::TrackingConfig;

use crate::error::{EngineError, EngineResult};

/// Default feather radius in pixels.
pub const DEFAULT_FEATHER_RADIUS_PX: f32 = 8.0;

/// Nominal poster texture size; the renderer follows the real image size.
pub const DEFAULT_POSTER_TEXTURE_PX: u32 = 1024;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub backend: BackendConfig,
    pub poll: PollConfig,
    pub tracking: TrackingConfig,
    /// Edge feather of the lip overlay, clamped by the renderer
    pub feather_radius_px: f32,
    pub poster_texture_px: u32,
    /// Dialogue sent with generation requests
    pub script_text: String,
    /// Voice sent with generation requests
    pub voice_id: String,
    /// Loop the lip video while the poster stays tracked
    pub looping: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            backend: BackendConfig::default(),
            poll: PollConfig::default(),
            tracking: TrackingConfig::default(),
            feather_radius_px: DEFAULT_FEATHER_RADIUS_PX,
            poster_texture_px: DEFAULT_POSTER_TEXTURE_PX,
            script_text: "Hello! Thanks for stopping by.".to_string(),
            voice_id: "default".to_string(),
            looping: true,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache: CacheConfig::from_env(),
            backend: BackendConfig::from_env(),
            poll: PollConfig::from_env(),
            tracking: TrackingConfig::from_env(),
            feather_radius_px: std::env::var("TPHOTO_FEATHER_RADIUS_PX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FEATHER_RADIUS_PX),
            poster_texture_px: std::env::var("TPHOTO_POSTER_TEXTURE_PX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POSTER_TEXTURE_PX),
            script_text: std::env::var("TPHOTO_SCRIPT_TEXT").unwrap_or(defaults.script_text),
            voice_id: std::env::var("TPHOTO_VOICE_ID").unwrap_or(defaults.voice_id),
            looping: std::env::var("TPHOTO_LOOP_VIDEO")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.script_text.trim().is_empty() {
            return Err(EngineError::config("TPHOTO_SCRIPT_TEXT must not be empty"));
        }
        if self.voice_id.trim().is_empty() {
            return Err(EngineError::config("TPHOTO_VOICE_ID must not be empty"));
        }
        if self.poster_texture_px == 0 {
            return Err(EngineError::config("poster texture size must be positive"));
        }
        if self.poll.interval.is_zero() || self.poll.timeout < self.poll.interval {
            return Err(EngineError::config(
                "poll interval must be positive and shorter than the poll timeout",
            ));
        }
        Ok(())
    }
}
