//! Session metrics collection.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Sessions started, labelled by video source (cache, backend).
    pub const SESSIONS_TOTAL: &str = "tphoto_engine_sessions_total";

    /// Sessions that reached rendering.
    pub const SESSIONS_READY_TOTAL: &str = "tphoto_engine_sessions_ready_total";

    /// Failed sessions by error kind.
    pub const SESSION_ERRORS_TOTAL: &str = "tphoto_engine_session_errors_total";

    /// Cached videos invalidated after a decode failure.
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "tphoto_engine_cache_invalidations_total";
}

pub fn record_session(source: &'static str) {
    counter!(names::SESSIONS_TOTAL, "source" => source).increment(1);
}

pub fn record_ready() {
    counter!(names::SESSIONS_READY_TOTAL).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!(names::SESSION_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_invalidation() {
    counter!(names::CACHE_INVALIDATIONS_TOTAL).increment(1);
}
