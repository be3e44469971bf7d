//! Structured job logging utilities.
//!
//! Provides consistent, structured lines for every stage of a job's life
//! with the job ID and kind attached as fields.

use std::time::Duration;

use tracing::{error, info, Span};
use vframe_models::{Job, JobId};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Create a logger for a job; the operation is the job kind.
    pub fn new(job: &Job) -> Self {
        Self::for_operation(&job.id, job.kind().as_str())
    }

    /// Create a logger for an arbitrary operation on a job.
    pub fn for_operation(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_queued(&self, queue_length: usize) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            queue_length,
            "Job queued"
        );
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Output already present; nothing was run.
    pub fn log_skipped(&self, output: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            output = %output,
            "Job skipped: output already exists"
        );
    }

    pub fn log_error(&self, message: &str, elapsed: Duration) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            elapsed_secs = elapsed.as_secs_f64(),
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            elapsed_secs = elapsed.as_secs_f64(),
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping the whole job, so FFmpeg and webhook lines carry the
    /// job context.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}
