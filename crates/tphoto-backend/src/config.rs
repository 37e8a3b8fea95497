//! Backend client configuration.

use std::time::Duration;

/// Default status poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default hard ceiling for polling a job to completion.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the generation backend
    pub base_url: String,
    /// Per-request timeout (downloads included)
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("TPHOTO_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("TPHOTO_BACKEND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("TPHOTO_BACKEND_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

/// Job polling configuration.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between consecutive status polls
    pub interval: Duration,
    /// Hard ceiling for the whole polling loop
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_millis(
                std::env::var("TPHOTO_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL.as_millis() as u64),
            ),
            timeout: Duration::from_secs(
                std::env::var("TPHOTO_POLL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_POLL_TIMEOUT.as_secs()),
            ),
        }
    }
}
