//! Structured session logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Initialize the global subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines; otherwise human-readable output.
/// Filtering follows `RUST_LOG`, defaulting to `info` for the engine crates.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tphoto=info,info"));

    if use_json {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .try_init();
    }
}

/// Session logger with consistent contextual fields.
///
/// One session covers one poster from detection to teardown.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
    poster_id: String,
}

impl SessionLogger {
    pub fn new(session_id: Uuid, poster_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            poster_id: poster_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            poster_id = %self.poster_id,
            "Session started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            poster_id = %self.poster_id,
            "Session progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            poster_id = %self.poster_id,
            "Session warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            poster_id = %self.poster_id,
            "Session error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            poster_id = %self.poster_id,
            "Session ended: {}", message
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn poster_id(&self) -> &str {
        &self.poster_id
    }

    /// Span to instrument the session's pipeline task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "session",
            session_id = %self.session_id,
            poster_id = %self.poster_id
        )
    }
}
