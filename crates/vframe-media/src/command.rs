//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::BufReader;
use tokio::process::{ChildStderr, Command};
use tracing::{debug, warn};

use vframe_models::ProgressSnapshot;

use crate::error::{MediaError, MediaResult};
use crate::progress::{progress_events, read_lossy_line, ProgressEvent};
use crate::sink::ProgressSink;

/// Default FFmpeg program name, resolved through `PATH`.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Histogram of FFmpeg wall-clock time in seconds.
pub const FFMPEG_DURATION_METRIC: &str = "vframe_ffmpeg_duration_seconds";

const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path or pattern
    output: PathBuf,
    /// Global arguments (before -i)
    global_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            global_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Add a global argument such as `-hide_banner`.
    pub fn global_arg(mut self, arg: impl Into<String>) -> Self {
        self.global_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set JPEG quality for image outputs (2 is best, 31 worst).
    pub fn image_quality(self, quality: u8) -> Self {
        self.output_arg("-q:v").output_arg(quality.to_string())
    }

    /// Set log level explicitly instead of the injected `error`.
    pub fn log_level(self, level: impl Into<String>) -> Self {
        self.global_arg("-loglevel").global_arg(level)
    }

    /// Build the command arguments, with the standard flags injected.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.extend(self.global_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        with_standard_flags(args)
    }
}

/// Prefix `args` with the flags every run relies on, unless the caller
/// already supplied them:
/// - `-y` (skipped when `-n` is present)
/// - `-nostdin`
/// - `-progress pipe:1`, which the runner parses from stdout
/// - `-loglevel error` (skipped when `-v` is present)
pub fn with_standard_flags(args: Vec<String>) -> Vec<String> {
    let has = |flags: &[&str]| args.iter().any(|a| flags.contains(&a.as_str()));

    let mut prefix: Vec<String> = Vec::new();
    if !has(&["-y", "-n"]) {
        prefix.push("-y".into());
    }
    if !has(&["-nostdin"]) {
        prefix.push("-nostdin".into());
    }
    if !has(&["-progress"]) {
        prefix.push("-progress".into());
        prefix.push("pipe:1".into());
    }
    if !has(&["-loglevel", "-v"]) {
        prefix.push("-loglevel".into());
        prefix.push("error".into());
    }

    if prefix.is_empty() {
        return args;
    }
    prefix.extend(args);
    prefix
}

/// Resolve a program name to an executable path.
///
/// Bare names go through `PATH`; anything with a directory component must
/// exist as given.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        path.is_file().then(|| path.to_path_buf())
    } else {
        which::which(program).ok()
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg(program: &str) -> MediaResult<PathBuf> {
    resolve_program(program).ok_or_else(|| MediaError::FfmpegNotFound(program.to_string()))
}

/// Runner for FFmpeg commands with progress tracking.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: String,
    timeout: Option<Duration>,
    duration_hint: Option<f64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner using `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: DEFAULT_FFMPEG.to_string(),
            timeout: None,
            duration_hint: None,
        }
    }

    /// Use a different FFmpeg binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the process if it runs longer than `timeout`. `None` waits
    /// indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Media duration in seconds, used to compute percent.
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration_hint = duration;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run an FFmpeg command, reporting progress to `sink`.
    pub async fn run(
        &self,
        cmd: &FfmpegCommand,
        sink: &dyn ProgressSink,
    ) -> MediaResult<ProgressSnapshot> {
        self.run_args(cmd.build_args(), sink).await
    }

    /// Run FFmpeg with a raw argument list.
    ///
    /// `sink.on_complete` fires only after the process exits with status 0;
    /// a non-zero exit calls `sink.on_error` and returns
    /// [`MediaError::FfmpegFailed`] carrying the stderr tail.
    pub async fn run_args(
        &self,
        args: Vec<String>,
        sink: &dyn ProgressSink,
    ) -> MediaResult<ProgressSnapshot> {
        let program = check_ffmpeg(&self.program)?;
        let args = with_standard_flags(args);
        debug!("Running FFmpeg: {} {}", program.display(), args.join(" "));

        let started = Instant::now();
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::SpawnFailed {
                program: program.display().to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_task = tokio::spawn(collect_stderr_tail(stderr, STDERR_TAIL_LINES));

        let duration_hint = self.duration_hint;
        let run = async {
            let events = progress_events(BufReader::new(stdout), duration_hint);
            futures_util::pin_mut!(events);

            let mut last = ProgressSnapshot::default();
            let mut saw_end = false;
            while let Some(event) = events.next().await {
                match event {
                    ProgressEvent::Progress(snapshot) => {
                        sink.on_progress(&snapshot);
                        last = snapshot;
                    }
                    ProgressEvent::Complete(snapshot) => {
                        last = snapshot;
                        saw_end = true;
                    }
                }
            }

            let status = child.wait().await;
            (last, saw_end, status)
        };

        let (snapshot, saw_end, status) = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, run).await;
                match waited {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            "FFmpeg timed out after {} seconds, killing process",
                            limit.as_secs()
                        );
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill timed out FFmpeg: {}", e);
                        }
                        stderr_task.abort();
                        sink.on_error(None, "timed out");
                        return Err(MediaError::Timeout(limit.as_secs()));
                    }
                }
            }
            None => run.await,
        };

        let status = status?;
        let stderr_tail = stderr_task.await.unwrap_or_default();
        metrics::histogram!(FFMPEG_DURATION_METRIC).record(started.elapsed().as_secs_f64());

        if status.success() {
            if !saw_end {
                debug!("FFmpeg exited cleanly without a progress=end block");
            }
            let mut finished = snapshot;
            finished.percent = 100;
            sink.on_complete(&finished);
            return Ok(finished);
        }

        let exit_code = status.code();
        let message = match exit_code {
            Some(code) => format!("FFmpeg exited with code {}", code),
            None => "FFmpeg terminated by signal".to_string(),
        };
        sink.on_error(exit_code, &message);

        Err(MediaError::ffmpeg_failed(
            message,
            (!stderr_tail.is_empty()).then_some(stderr_tail),
            exit_code,
        ))
    }
}

/// Keep the last `max_lines` non-empty stderr lines. Reads to EOF so FFmpeg
/// never writes into a closed pipe.
async fn collect_stderr_tail(stderr: ChildStderr, max_lines: usize) -> String {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(max_lines);

    while let Ok(Some(line)) = read_lossy_line(&mut reader, &mut buf).await {
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() >= max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}
