//! Backend metrics collection.

use metrics::counter;
use tphoto_models::JobStatus;

/// Metric name constants for consistency.
pub mod names {
    /// Submitted generation jobs.
    pub const JOBS_SUBMITTED_TOTAL: &str = "tphoto_backend_jobs_submitted_total";

    /// Status polls by observed status.
    pub const POLLS_TOTAL: &str = "tphoto_backend_polls_total";

    /// Finished polling loops by outcome (complete, failed, timeout, error).
    pub const JOB_OUTCOMES_TOTAL: &str = "tphoto_backend_job_outcomes_total";
}

pub fn record_submit() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_poll(status: JobStatus) {
    counter!(names::POLLS_TOTAL, "status" => status.as_str()).increment(1);
}

pub fn record_outcome(outcome: &'static str) {
    counter!(names::JOB_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
}
