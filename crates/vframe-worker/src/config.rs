//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{WorkerError, WorkerResult};

/// Where FFmpeg progress is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressOutput {
    /// Structured log lines through `tracing`
    #[default]
    Log,
    /// In-place terminal progress bar
    Terminal,
}

impl FromStr for ProgressOutput {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "terminal" | "tty" => Ok(Self::Terminal),
            other => Err(WorkerError::config_error(format!(
                "PROGRESS_OUTPUT must be 'log' or 'terminal', got '{}'",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Default webhook receiving job outcomes; jobs may override it
    pub callback_url: Option<Url>,
    /// Pause between consecutive jobs
    pub inter_job_delay: Duration,
    /// Usage percentage above which memory counts as unavailable
    pub memory_threshold_percent: f64,
    /// Background sampling period for high-memory callbacks
    pub memory_sample_interval: Duration,
    /// Longest a job waits at the memory gate before it is deferred
    pub admission_max_wait: Duration,
    /// Re-check period while waiting at the memory gate
    pub admission_poll_interval: Duration,
    /// Webhook request timeout
    pub notify_timeout: Duration,
    /// FFmpeg program name or path
    pub ffmpeg_path: String,
    /// FFprobe program name or path
    pub ffprobe_path: String,
    /// Kill FFmpeg after this long; `None` lets it run to completion
    pub process_timeout: Option<Duration>,
    /// Progress rendering
    pub progress_output: ProgressOutput,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            inter_job_delay: Duration::from_millis(1000),
            memory_threshold_percent: 70.0,
            memory_sample_interval: Duration::from_secs(30),
            admission_max_wait: Duration::from_secs(300), // 5 minutes
            admission_poll_interval: Duration::from_secs(5),
            notify_timeout: Duration::from_millis(10_000),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            process_timeout: None,
            progress_output: ProgressOutput::Log,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source. Unparseable numbers fall back
    /// to their defaults; an invalid callback URL or progress output is an
    /// error.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let callback_url = match lookup("VFRAME_CALLBACK_URL").filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_callback_url(&raw)?),
            None => None,
        };

        let progress_output = match lookup("PROGRESS_OUTPUT") {
            Some(raw) => raw.parse()?,
            None => defaults.progress_output,
        };

        let config = Self {
            callback_url,
            inter_job_delay: number("WORKER_INTER_JOB_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_job_delay),
            memory_threshold_percent: lookup("MEMORY_THRESHOLD_PERCENT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.memory_threshold_percent),
            memory_sample_interval: number("MEMORY_SAMPLE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.memory_sample_interval),
            admission_max_wait: number("ADMISSION_MAX_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.admission_max_wait),
            admission_poll_interval: number("ADMISSION_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.admission_poll_interval),
            notify_timeout: number("NOTIFY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.notify_timeout),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            // 0 disables the limit
            process_timeout: match number("FFMPEG_TIMEOUT_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.process_timeout,
            },
            progress_output,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the executor cannot work with.
    pub fn validate(&self) -> WorkerResult<()> {
        if !(self.memory_threshold_percent > 0.0 && self.memory_threshold_percent <= 100.0) {
            return Err(WorkerError::config_error(format!(
                "MEMORY_THRESHOLD_PERCENT must be in (0, 100], got {}",
                self.memory_threshold_percent
            )));
        }
        if self.admission_poll_interval.is_zero() {
            return Err(WorkerError::config_error(
                "ADMISSION_POLL_INTERVAL_SECS must be greater than zero",
            ));
        }
        if self.memory_sample_interval.is_zero() {
            return Err(WorkerError::config_error(
                "MEMORY_SAMPLE_INTERVAL_SECS must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Parse a webhook URL, accepting only http(s).
pub fn parse_callback_url(raw: &str) -> WorkerResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| WorkerError::config_error(format!("Invalid callback URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(WorkerError::config_error(format!(
            "Callback URL must be http or https, got '{}'",
            scheme
        ))),
    }
}
