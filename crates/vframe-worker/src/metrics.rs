//! Worker metrics.
//!
//! Recorded through the `metrics` facade; no exporter is installed here, so
//! these are no-ops unless the embedding process registers a recorder.

use metrics::{counter, gauge, histogram};

use vframe_models::JobKind;

/// Metric name constants for consistency.
pub mod names {
    /// Jobs accepted by `submit`, by kind.
    pub const JOBS_ENQUEUED: &str = "vframe_jobs_enqueued_total";

    /// Jobs that ran to completion, by kind.
    pub const JOBS_COMPLETED: &str = "vframe_jobs_completed_total";

    /// Jobs that failed, by kind and reason.
    pub const JOBS_FAILED: &str = "vframe_jobs_failed_total";

    /// Jobs skipped because the output already existed, by kind.
    pub const JOBS_SKIPPED: &str = "vframe_jobs_skipped_total";

    /// Jobs waiting behind the executing one.
    pub const QUEUE_LENGTH: &str = "vframe_queue_length";

    /// Wall-clock job duration in seconds, by kind.
    pub const JOB_DURATION_SECONDS: &str = "vframe_job_duration_seconds";

    /// Last sampled memory usage percentage.
    pub const MEMORY_USAGE_PERCENT: &str = "vframe_memory_usage_percent";

    /// Webhook deliveries by outcome.
    pub const NOTIFICATIONS_TOTAL: &str = "vframe_notifications_total";
}

pub fn record_enqueued(kind: JobKind) {
    counter!(names::JOBS_ENQUEUED, "kind" => kind.as_str()).increment(1);
}

pub fn record_completed(kind: JobKind, duration_secs: f64) {
    counter!(names::JOBS_COMPLETED, "kind" => kind.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind.as_str()).record(duration_secs);
}

pub fn record_failed(kind: JobKind, reason: &'static str) {
    counter!(names::JOBS_FAILED, "kind" => kind.as_str(), "reason" => reason).increment(1);
}

pub fn record_skipped(kind: JobKind) {
    counter!(names::JOBS_SKIPPED, "kind" => kind.as_str()).increment(1);
}

pub fn set_queue_length(len: usize) {
    gauge!(names::QUEUE_LENGTH).set(len as f64);
}

pub fn set_memory_usage(percent: f64) {
    gauge!(names::MEMORY_USAGE_PERCENT).set(percent);
}

pub fn record_notification(outcome: &'static str) {
    counter!(names::NOTIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}
