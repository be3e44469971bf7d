//! Worker error types.

use std::time::Duration;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Insufficient memory: admission deferred after waiting {waited_secs}s")]
    AdmissionDeferred { waited_secs: u64 },

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job was dropped before it finished: {0}")]
    Abandoned(String),

    #[error("Media error: {0}")]
    Media(#[from] vframe_media::MediaError),
}

impl WorkerError {
    pub fn admission_deferred(waited: Duration) -> Self {
        Self::AdmissionDeferred {
            waited_secs: waited.as_secs(),
        }
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if the job was turned away by the memory gate without running.
    pub fn is_admission_deferred(&self) -> bool {
        matches!(self, WorkerError::AdmissionDeferred { .. })
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkerError::AdmissionDeferred { .. } => "admission",
            WorkerError::Media(e) if e.is_process_failure() => "process",
            WorkerError::Media(_) | WorkerError::ProcessingFailed(_) => "processing",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Abandoned(_) => "abandoned",
        }
    }
}

/// Webhook delivery failure. Logged by the dispatcher, never surfaced as a
/// job failure.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {status}")]
    Status { status: u16 },
}

pub type NotifyResult<T> = Result<T, NotifyError>;
