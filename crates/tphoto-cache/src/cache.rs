//! Video cache service.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tphoto_models::{CachedVideo, Clock, LipCoordinates};

use crate::checksum::{checksums_match, sha256_file_async};
use crate::config::CacheConfig;
use crate::error::{is_no_space_error, StorageError, StorageResult};
use crate::fs_utils::{move_into_place, remove_if_exists};
use crate::index::CacheIndex;
use crate::metrics;

const VIDEO_EXTENSION: &str = "mp4";
const SIDECAR_EXTENSION: &str = "json";
const PARTIAL_EXTENSION: &str = "part";

/// Generate the file stem for a poster id.
///
/// Ids made of `[A-Za-z0-9_-]` are used verbatim; anything else is
/// sanitized and suffixed with a short hash of the original id.
pub fn cache_key(poster_id: &str) -> String {
    let safe = !poster_id.is_empty()
        && poster_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        return poster_id.to_string();
    }

    let sanitized: String = poster_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    let digest = format!("{:x}", Sha256::digest(poster_id.as_bytes()));
    format!("{}-{}", sanitized, &digest[..8])
}

/// Point-in-time cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Bounded, self-healing cache of lip-sync videos keyed by poster id.
///
/// All mutation goes through the methods below while holding a single
/// async mutex, so a retrieve, evict and store for the same id never
/// interleave.
pub struct VideoCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    index: Mutex<CacheIndex>,
}

impl VideoCache {
    /// Open (or create) the cache directory and rebuild the index from sidecars.
    pub async fn open(config: CacheConfig, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        fs::create_dir_all(&config.dir).await?;
        let index = rebuild_index(&config.dir).await?;

        let cache = Self {
            config,
            clock,
            index: Mutex::new(index),
        };

        {
            let mut index = cache.index.lock().await;
            info!(
                dir = %cache.config.dir.display(),
                entries = index.len(),
                total_bytes = index.total_bytes(),
                "Video cache opened"
            );
            cache.enforce_limits(&mut index, None).await;
        }

        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    fn video_path(&self, poster_id: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{}", cache_key(poster_id), VIDEO_EXTENSION))
    }

    fn sidecar_path(&self, poster_id: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{}", cache_key(poster_id), SIDECAR_EXTENSION))
    }

    /// Temporary download target for a poster, inside the cache directory.
    ///
    /// Leftover partial files are removed the next time the cache is opened.
    pub fn incoming_path(&self, poster_id: &str) -> PathBuf {
        self.config.dir.join(format!(
            "{}.{}.{}",
            cache_key(poster_id),
            VIDEO_EXTENSION,
            PARTIAL_EXTENSION
        ))
    }

    /// Look up a verified entry.
    ///
    /// Returns `None` on a miss. A missing file, an expired entry or a
    /// checksum mismatch deletes the entry and is reported as a miss too.
    pub async fn retrieve(&self, poster_id: &str) -> Option<CachedVideo> {
        let mut index = self.index.lock().await;

        let video = match index.get(poster_id) {
            Some(entry) => entry.video.clone(),
            None => {
                debug!(poster_id = %poster_id, "Video cache MISS");
                metrics::record_lookup("miss");
                return None;
            }
        };

        if let Some(reason) = self.verify(&video).await {
            warn!(poster_id = %poster_id, reason = reason, "Discarding cached video");
            metrics::record_lookup(reason);
            self.remove_entry(&mut index, poster_id).await;
            return None;
        }

        index.touch(poster_id, self.clock.utc_now());
        info!(poster_id = %poster_id, size_bytes = video.size_bytes, "Video cache HIT");
        metrics::record_lookup("hit");
        Some(video)
    }

    /// Returns the failure reason if the entry cannot be trusted.
    async fn verify(&self, video: &CachedVideo) -> Option<&'static str> {
        if fs::metadata(&video.video_path).await.is_err() {
            return Some("missing");
        }

        let age = self.clock.utc_now() - video.cached_at;
        let max_age = chrono::Duration::from_std(self.config.max_age)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        if age >= max_age {
            return Some("expired");
        }

        match sha256_file_async(&video.video_path).await {
            Ok(actual) if checksums_match(&video.checksum, &actual) => None,
            Ok(_) => Some("corrupt"),
            Err(e) => {
                debug!(error = %e, "Failed to hash cached video");
                Some("corrupt")
            }
        }
    }

    /// Move a validated video into the cache.
    ///
    /// `source` is consumed (moved) on success. The file is hashed and must
    /// match `checksum`. Count and size eviction run after the insert and
    /// never evict the entry just stored.
    pub async fn store(
        &self,
        poster_id: &str,
        source: &Path,
        lip_coordinates: LipCoordinates,
        checksum: &str,
    ) -> StorageResult<CachedVideo> {
        if poster_id.trim().is_empty() {
            return Err(StorageError::invalid_key(poster_id));
        }

        let meta = fs::metadata(source)
            .await
            .map_err(|_| StorageError::SourceMissing(source.to_path_buf()))?;
        let size_bytes = meta.len();

        // Total must stay strictly below the budget, so a file filling it alone is rejected.
        if size_bytes >= self.config.max_bytes {
            return Err(StorageError::storage_full(format!(
                "video is {} bytes but the cache budget is {} bytes",
                size_bytes, self.config.max_bytes
            )));
        }

        let actual = sha256_file_async(source).await?;
        if !checksums_match(checksum, &actual) {
            return Err(StorageError::ChecksumMismatch {
                expected: checksum.to_string(),
                actual,
            });
        }

        let mut index = self.index.lock().await;

        let video = CachedVideo {
            poster_id: poster_id.to_string(),
            video_path: self.video_path(poster_id),
            lip_coordinates,
            checksum: actual,
            cached_at: self.clock.utc_now(),
            size_bytes,
        };

        match self.write_entry(source, &video).await {
            Ok(()) => {}
            Err(e) if e.is_storage_full() => {
                warn!(
                    poster_id = %poster_id,
                    "Cache directory out of space, forcing eviction before retry"
                );
                for id in index.lru_order() {
                    if id != poster_id {
                        metrics::record_eviction("forced");
                        self.remove_entry(&mut index, &id).await;
                    }
                }
                if let Err(e) = self.write_entry(source, &video).await {
                    return Err(if e.is_storage_full() {
                        StorageError::storage_full("not enough space after evicting all entries")
                    } else {
                        e
                    });
                }
            }
            Err(e) => return Err(e),
        }

        index.insert(video.clone(), video.cached_at);
        metrics::record_store();
        info!(
            poster_id = %poster_id,
            size_bytes = size_bytes,
            entries = index.len(),
            "Video cache stored"
        );

        self.enforce_limits(&mut index, Some(poster_id)).await;
        Ok(video)
    }

    async fn write_entry(&self, source: &Path, video: &CachedVideo) -> StorageResult<()> {
        // A retry after a failed sidecar write finds the video already moved.
        let already_moved = fs::metadata(source).await.is_err()
            && fs::metadata(&video.video_path).await.is_ok();
        if source != video.video_path && !already_moved {
            move_into_place(source, &video.video_path)
                .await
                .map_err(|e| {
                    if is_no_space_error(&e) {
                        StorageError::storage_full(e.to_string())
                    } else {
                        StorageError::Io(e)
                    }
                })?;
        }

        let sidecar = serde_json::to_vec_pretty(video)?;
        fs::write(self.sidecar_path(&video.poster_id), sidecar)
            .await
            .map_err(|e| {
                if is_no_space_error(&e) {
                    StorageError::storage_full(e.to_string())
                } else {
                    StorageError::Io(e)
                }
            })?;
        Ok(())
    }

    async fn enforce_limits(&self, index: &mut CacheIndex, protect: Option<&str>) {
        let plan = index.eviction_plan(self.config.max_entries, self.config.max_bytes, protect);
        for (id, reason) in plan {
            debug!(poster_id = %id, reason = reason.as_str(), "Evicting cached video");
            if self.remove_entry(index, &id).await {
                metrics::record_eviction(reason.as_str());
            }
        }
    }

    /// Delete the backing files, then drop the index entry.
    ///
    /// If the video file cannot be deleted the index entry is kept so the
    /// file is never orphaned.
    async fn remove_entry(&self, index: &mut CacheIndex, poster_id: &str) -> bool {
        let video_path = index
            .get(poster_id)
            .map(|e| e.video.video_path.clone())
            .unwrap_or_else(|| self.video_path(poster_id));

        if let Err(e) = remove_if_exists(&video_path).await {
            warn!(
                poster_id = %poster_id,
                error = %e,
                "Failed to delete cached video, keeping index entry"
            );
            return false;
        }
        if let Err(e) = remove_if_exists(&self.sidecar_path(poster_id)).await {
            warn!(poster_id = %poster_id, error = %e, "Failed to delete cache sidecar");
        }
        index.remove(poster_id).is_some()
    }

    /// Drop an entry whose video failed to decode so the next attempt re-downloads.
    pub async fn invalidate(&self, poster_id: &str) -> bool {
        let mut index = self.index.lock().await;
        if index.get(poster_id).is_none() {
            return false;
        }
        info!(poster_id = %poster_id, "Invalidating cached video");
        self.remove_entry(&mut index, poster_id).await
    }

    /// Remove every entry and its files.
    pub async fn clear(&self) -> StorageResult<()> {
        let mut index = self.index.lock().await;
        for id in index.ids() {
            let video_path = self.video_path(&id);
            remove_if_exists(&video_path).await?;
            remove_if_exists(&self.sidecar_path(&id)).await?;
            index.remove(&id);
        }
        info!("Video cache cleared");
        Ok(())
    }

    /// Whether an entry is indexed (without verifying it).
    pub async fn contains(&self, poster_id: &str) -> bool {
        self.index.lock().await.get(poster_id).is_some()
    }

    pub async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        CacheStats {
            entries: index.len(),
            total_bytes: index.total_bytes(),
        }
    }
}

/// Scan the cache directory and rebuild the index from sidecars.
///
/// Removes partial downloads, videos without a sidecar and sidecars
/// without a video.
async fn rebuild_index(dir: &Path) -> StorageResult<CacheIndex> {
    let mut sidecars = Vec::new();
    let mut videos = Vec::new();

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some(SIDECAR_EXTENSION) => sidecars.push(path),
            Some(VIDEO_EXTENSION) => videos.push(path),
            Some(PARTIAL_EXTENSION) | Some("tmp") => {
                debug!(path = %path.display(), "Removing stale partial download");
                remove_if_exists(&path).await?;
            }
            _ => {}
        }
    }

    let mut loaded = Vec::new();
    for sidecar in sidecars {
        let video_path = sidecar.with_extension(VIDEO_EXTENSION);
        let parsed = fs::read(&sidecar)
            .await
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CachedVideo>(&bytes).ok());

        match parsed {
            Some(mut video) if fs::metadata(&video_path).await.is_ok() => {
                video.video_path = video_path;
                loaded.push(video);
            }
            _ => {
                warn!(sidecar = %sidecar.display(), "Dropping unreadable or orphaned cache sidecar");
                remove_if_exists(&sidecar).await?;
                remove_if_exists(&video_path).await?;
            }
        }
    }

    for video in videos {
        if fs::metadata(video.with_extension(SIDECAR_EXTENSION)).await.is_err() {
            warn!(path = %video.display(), "Removing cached video without sidecar");
            remove_if_exists(&video).await?;
        }
    }

    loaded.sort_by(|a, b| a.cached_at.cmp(&b.cached_at));
    let mut index = CacheIndex::new();
    for video in loaded {
        let cached_at = video.cached_at;
        index.insert(video, cached_at);
    }
    Ok(index)
}
