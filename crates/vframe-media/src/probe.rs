//! Media duration lookup through FFprobe.
//!
//! The duration is only a hint for progress percentages, so every failure
//! here degrades to "unknown" at the [`probe_duration`] boundary.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::command::resolve_program;
use crate::error::{MediaError, MediaResult};

/// Default FFprobe program name, resolved through `PATH`.
pub const DEFAULT_FFPROBE: &str = "ffprobe";

#[derive(Debug, Deserialize)]
struct DurationProbe {
    #[serde(default)]
    format: Option<Entry>,
    #[serde(default)]
    streams: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    duration: Option<String>,
}

impl Entry {
    fn seconds(&self) -> Option<f64> {
        self.duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    }
}

/// Run FFprobe on `path` and return the media duration in seconds.
pub async fn probe_duration_with(program: &str, path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = resolve_program(program)
        .ok_or_else(|| MediaError::FfprobeNotFound(program.to_string()))?;

    let output = Command::new(&ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_entries",
            "format=duration:stream=duration",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_duration(&output.stdout)
        .ok_or_else(|| MediaError::UnknownDuration(path.to_path_buf()))
}

/// Container duration, else the longest stream. Audio-only and image
/// inputs are fine as long as something reports a duration.
fn parse_duration(stdout: &[u8]) -> Option<f64> {
    let probe: DurationProbe = match serde_json::from_slice(stdout) {
        Ok(probe) => probe,
        Err(e) => {
            debug!("Unparseable FFprobe output: {}", e);
            return None;
        }
    };

    probe.format.as_ref().and_then(Entry::seconds).or_else(|| {
        probe
            .streams
            .iter()
            .filter_map(Entry::seconds)
            .max_by(f64::total_cmp)
    })
}

/// Duration hint for progress percentages.
///
/// Any probe failure yields `None` so progress stays indeterminate instead
/// of failing the job.
pub async fn probe_duration(program: &str, path: impl AsRef<Path>) -> Option<f64> {
    let path = path.as_ref();
    match probe_duration_with(program, path).await {
        Ok(duration) => Some(duration),
        Err(e) => {
            debug!(path = %path.display(), "No duration hint, progress will be indeterminate: {}", e);
            None
        }
    }
}
