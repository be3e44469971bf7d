//! Video ingest worker.
//!
//! This crate provides:
//! - Single-worker FIFO executor for transcode and frame extraction jobs
//! - Memory-based admission control
//! - Skipping of jobs whose output already exists
//! - Webhook notification of job outcomes

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod processor;

pub use config::{ProgressOutput, WorkerConfig};
pub use error::{NotifyError, WorkerError, WorkerResult};
pub use executor::{JobHandle, JobOutcome, TaskExecutor};
pub use logging::JobLogger;
pub use memory::{MemoryMonitor, MemoryProbe, SystemMemoryProbe};
pub use notifier::{JobNotifier, NotificationDispatcher, WebhookNotifier};
pub use processor::{FfmpegProcessor, MediaProcessor, ProcessReport};
