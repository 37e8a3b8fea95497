//! Cache metrics collection.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Cache lookups by result (hit, miss, corrupt, expired).
    pub const LOOKUPS_TOTAL: &str = "tphoto_cache_lookups_total";

    /// Evicted entries by reason (count, size, forced).
    pub const EVICTIONS_TOTAL: &str = "tphoto_cache_evictions_total";

    /// Successful stores.
    pub const STORES_TOTAL: &str = "tphoto_cache_stores_total";
}

pub fn record_lookup(result: &'static str) {
    counter!(names::LOOKUPS_TOTAL, "result" => result).increment(1);
}

pub fn record_eviction(reason: &'static str) {
    counter!(names::EVICTIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_store() {
    counter!(names::STORES_TOTAL).increment(1);
}
