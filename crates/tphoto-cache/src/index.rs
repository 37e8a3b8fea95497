//! In-memory cache index with LRU bookkeeping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tphoto_models::CachedVideo;

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub video: CachedVideo,
    pub last_access: DateTime<Utc>,
    pub insertion_seq: u64,
}

/// Why an entry was chosen for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionReason {
    Count,
    Size,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Count => "count",
            EvictionReason::Size => "size",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheIndex {
    entries: HashMap<String, IndexEntry>,
    next_seq: u64,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.video.size_bytes).sum()
    }

    pub fn get(&self, poster_id: &str) -> Option<&IndexEntry> {
        self.entries.get(poster_id)
    }

    /// Insert or replace an entry; replacing counts as a fresh insertion.
    pub fn insert(&mut self, video: CachedVideo, now: DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            video.poster_id.clone(),
            IndexEntry {
                video,
                last_access: now,
                insertion_seq: seq,
            },
        );
    }

    pub fn touch(&mut self, poster_id: &str, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(poster_id) {
            entry.last_access = now;
        }
    }

    pub fn remove(&mut self, poster_id: &str) -> Option<CachedVideo> {
        self.entries.remove(poster_id).map(|e| e.video)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Poster ids from least to most recently used; ties by insertion order.
    pub fn lru_order(&self) -> Vec<String> {
        let mut entries: Vec<&IndexEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.last_access
                .cmp(&b.last_access)
                .then(a.insertion_seq.cmp(&b.insertion_seq))
        });
        entries.into_iter().map(|e| e.video.poster_id.clone()).collect()
    }

    /// Entries to drop so that the count limit holds and total bytes end strictly below `max_bytes`.
    ///
    /// `protect` is never selected (the entry that was just stored).
    pub fn eviction_plan(
        &self,
        max_entries: usize,
        max_bytes: u64,
        protect: Option<&str>,
    ) -> Vec<(String, EvictionReason)> {
        let mut count = self.len();
        let mut bytes = self.total_bytes();
        let mut plan = Vec::new();

        for id in self.lru_order() {
            if count <= max_entries && bytes < max_bytes {
                break;
            }
            if protect == Some(id.as_str()) {
                continue;
            }
            let reason = if count > max_entries {
                EvictionReason::Count
            } else {
                EvictionReason::Size
            };
            if let Some(entry) = self.entries.get(&id) {
                count -= 1;
                bytes = bytes.saturating_sub(entry.video.size_bytes);
            }
            plan.push((id, reason));
        }
        plan
    }
}
