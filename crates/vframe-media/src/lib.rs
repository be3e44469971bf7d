#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the ingest worker.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with standard flag injection
//! - Progress parsing from `-progress pipe:1` as a lazy event stream
//! - Progress sinks for logs and terminals
//! - Transcode and frame extraction operations
//! - Output existence checks and FFprobe duration hints

pub mod command;
pub mod error;
pub mod frames;
pub mod output_check;
pub mod probe;
pub mod progress;
pub mod sink;
pub mod transcode;

pub use command::{
    check_ffmpeg, resolve_program, with_standard_flags, FfmpegCommand, FfmpegRunner,
    DEFAULT_FFMPEG,
};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frames, frame_extract_command};
pub use output_check::{
    count_frames, file_exists, has_frames, has_images, is_frame_name, output_exists,
};
pub use probe::{probe_duration, probe_duration_with, DEFAULT_FFPROBE};
pub use progress::{progress_events, ProgressEvent, ProgressParser, ProgressUpdate};
pub use sink::{LogProgressSink, NullProgressSink, ProgressSink, TerminalProgressSink};
pub use transcode::{transcode, transcode_command};
