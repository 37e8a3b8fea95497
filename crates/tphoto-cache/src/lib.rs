//! Local cache of generated lip-sync videos.
//!
//! One video file plus one JSON sidecar per poster id, indexed in memory and
//! guarded by a single async mutex. Entries are verified against their
//! SHA-256 checksum on every retrieval; corrupt or expired entries are
//! deleted and reported as a miss.

pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod fs_utils;
mod index;
pub mod metrics;

pub use cache::{cache_key, CacheStats, VideoCache};
pub use checksum::{checksums_match, sha256_bytes, sha256_file, sha256_file_async, CHUNK_SIZE};
pub use config::CacheConfig;
pub use error::{StorageError, StorageResult};
