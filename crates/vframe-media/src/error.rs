//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found: {0}")]
    FfprobeNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No duration reported for {0}")]
    UnknownDuration(PathBuf),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Exit code of a failed external process, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::FfmpegFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Whether the external process ran and reported failure, as opposed to
    /// never starting.
    pub fn is_process_failure(&self) -> bool {
        matches!(self, Self::FfmpegFailed { .. } | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_accessor() {
        let err = MediaError::ffmpeg_failed("boom", None, Some(1));
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.is_process_failure());

        let err = MediaError::FfmpegNotFound("ffmpeg".into());
        assert_eq!(err.exit_code(), None);
        assert!(!err.is_process_failure());
    }
}
