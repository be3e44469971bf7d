//! Progress snapshot accumulated from an FFmpeg `-progress` stream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Working record of an external process's progress.
///
/// Fields stay `None` until the corresponding key has been observed.
/// `percent` is 0 while indeterminate (no duration or no elapsed time yet).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressSnapshot {
    /// Frames written so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    /// Instantaneous encoding FPS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Encoder quantizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<f64>,
    /// Output size as reported (e.g. `1024kB` or a byte count)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Elapsed media time as reported (`HH:MM:SS.ff`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Elapsed media time in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
    /// Bitrate as reported (e.g. `1500.2kbits/s`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// Speed multiplier as reported (e.g. `1.5x`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    /// Percent complete (0-100)
    pub percent: u8,
}
