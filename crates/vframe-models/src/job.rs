//! Job definitions for the ingest queue.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// Default output file pattern for frame extraction.
pub const DEFAULT_FRAME_PATTERN: &str = "frame_%06d.jpg";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Re-encode the input into a single output file
    Transcode,
    /// Dump frames from the input into an output directory
    FrameExtract,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Transcode => "transcode",
            JobKind::FrameExtract => "frame_extract",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a transcode job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscodeOptions {
    /// Video codec (e.g. `libx264`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Audio codec (e.g. `aac`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Constant rate factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    /// Encoder preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Extra output arguments appended verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

/// Parameters for a frame extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameExtractOptions {
    /// Frames per second to sample
    pub fps: f64,
    /// Output file name pattern inside the output directory
    #[serde(default = "default_frame_pattern")]
    pub pattern: String,
    /// JPEG quality (`-q:v`, 2 = best)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

fn default_frame_pattern() -> String {
    DEFAULT_FRAME_PATTERN.to_string()
}

impl FrameExtractOptions {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            pattern: default_frame_pattern(),
            quality: None,
        }
    }
}

/// Kind-specific job parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOptions {
    Transcode(TranscodeOptions),
    FrameExtract(FrameExtractOptions),
}

impl JobOptions {
    pub fn kind(&self) -> JobKind {
        match self {
            JobOptions::Transcode(_) => JobKind::Transcode,
            JobOptions::FrameExtract(_) => JobKind::FrameExtract,
        }
    }
}

/// A unit of work submitted to the executor.
///
/// Paths are not validated at submission time; a missing input surfaces as a
/// process failure when the job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    #[serde(default)]
    pub id: JobId,

    /// Input video
    pub input_path: PathBuf,

    /// Output file (transcode) or directory (frame extraction)
    pub output_path: PathBuf,

    /// Kind-specific parameters; also determines the job kind
    pub options: JobOptions,

    /// Webhook override for this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub callback_url: Option<Url>,

    /// Submission timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Job {
    fn new(input: impl AsRef<Path>, output: impl AsRef<Path>, options: JobOptions) -> Self {
        Self {
            id: JobId::new(),
            input_path: input.as_ref().to_path_buf(),
            output_path: output.as_ref().to_path_buf(),
            options,
            callback_url: None,
            created_at: Utc::now(),
        }
    }

    /// Create a transcode job with default encoder settings.
    pub fn transcode(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::new(input, output, JobOptions::Transcode(TranscodeOptions::default()))
    }

    /// Create a transcode job with explicit options.
    pub fn transcode_with(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: TranscodeOptions,
    ) -> Self {
        Self::new(input, output, JobOptions::Transcode(options))
    }

    /// Create a frame extraction job sampling `fps` frames per second.
    pub fn frame_extract(input: impl AsRef<Path>, output_dir: impl AsRef<Path>, fps: f64) -> Self {
        Self::new(
            input,
            output_dir,
            JobOptions::FrameExtract(FrameExtractOptions::new(fps)),
        )
    }

    /// Set the per-job webhook.
    pub fn with_callback_url(mut self, url: Url) -> Self {
        self.callback_url = Some(url);
        self
    }

    pub fn kind(&self) -> JobKind {
        self.options.kind()
    }

    /// Short human-readable description used in logs and queue status.
    pub fn describe(&self) -> String {
        format!(
            "{} {} -> {}",
            self.kind(),
            self.input_path.display(),
            self.output_path.display()
        )
    }
}
