//! Shared data models for the vframe ingest pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their kind-specific options
//! - Progress snapshots parsed from FFmpeg
//! - Host memory readings
//! - Queue status and webhook payloads

pub mod job;
pub mod memory;
pub mod notification;
pub mod progress;
pub mod queue;
pub mod timestamp;

// Re-export common types
pub use job::{
    FrameExtractOptions, Job, JobId, JobKind, JobOptions, TranscodeOptions, DEFAULT_FRAME_PATTERN,
};
pub use memory::MemoryReading;
pub use notification::NotificationPayload;
pub use progress::ProgressSnapshot;
pub use queue::QueueStatus;
pub use timestamp::{parse_media_time, TimestampError};
