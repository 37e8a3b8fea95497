//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default maximum number of cached videos.
pub const DEFAULT_MAX_ENTRIES: usize = 3;

/// Default byte budget (50 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Default entry lifetime (24 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// App-private directory holding videos and sidecars
    pub dir: PathBuf,
    /// Count-based eviction threshold
    pub max_entries: usize,
    /// Size-based eviction threshold in bytes
    pub max_bytes: u64,
    /// Entries older than this are treated as corrupt
    pub max_age: Duration,
}

impl CacheConfig {
    /// Config with default limits rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("TPHOTO_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("tphoto-cache")),
            max_entries: std::env::var("TPHOTO_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ENTRIES),
            max_bytes: std::env::var("TPHOTO_CACHE_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_BYTES),
            max_age: Duration::from_secs(
                std::env::var("TPHOTO_CACHE_MAX_AGE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_AGE.as_secs()),
            ),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("tphoto-cache"))
    }
}
