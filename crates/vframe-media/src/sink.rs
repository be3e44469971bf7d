//! Consumers of FFmpeg progress.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use vframe_models::ProgressSnapshot;

/// Receives progress from a running FFmpeg process.
///
/// `on_complete` and `on_error` are mutually exclusive and called at most once
/// per run.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);

    fn on_complete(&self, snapshot: &ProgressSnapshot);

    fn on_error(&self, exit_code: Option<i32>, message: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
    fn on_complete(&self, _snapshot: &ProgressSnapshot) {}
    fn on_error(&self, _exit_code: Option<i32>, _message: &str) {}
}

/// Writes progress through `tracing`.
///
/// A line is logged at info level whenever percent moves; repeats go to debug.
pub struct LogProgressSink {
    label: String,
    last_percent: Mutex<Option<u8>>,
}

impl LogProgressSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_percent: Mutex::new(None),
        }
    }

    fn percent_changed(&self, percent: u8) -> bool {
        let mut last = self.last_percent.lock().unwrap_or_else(|e| e.into_inner());
        let changed = *last != Some(percent);
        *last = Some(percent);
        changed
    }
}

impl ProgressSink for LogProgressSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if self.percent_changed(snapshot.percent) {
            info!(
                job = %self.label,
                percent = snapshot.percent,
                frame = ?snapshot.frame,
                fps = ?snapshot.fps,
                time = ?snapshot.time,
                speed = ?snapshot.speed,
                "Progress"
            );
        } else {
            debug!(
                job = %self.label,
                percent = snapshot.percent,
                frame = ?snapshot.frame,
                "Progress"
            );
        }
    }

    fn on_complete(&self, snapshot: &ProgressSnapshot) {
        info!(
            job = %self.label,
            frame = ?snapshot.frame,
            "Processing complete"
        );
    }

    fn on_error(&self, exit_code: Option<i32>, message: &str) {
        warn!(
            job = %self.label,
            exit_code = ?exit_code,
            "Processing failed: {}",
            message
        );
    }
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Redraws a terminal progress bar in place.
pub struct TerminalProgressSink {
    bar: ProgressBar,
}

impl TerminalProgressSink {
    pub fn new(label: impl Into<String>) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(100).with_style(style);
        bar.set_prefix(label.into());
        Self { bar }
    }

    /// Underlying bar, for callers that manage several at once.
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl ProgressSink for TerminalProgressSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(u64::from(snapshot.percent));
        self.bar.set_message(status_line(snapshot));
    }

    fn on_complete(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(100);
        self.bar
            .finish_with_message(format!("{} done", self.bar.prefix()));
        debug!(frame = ?snapshot.frame, "Terminal progress finished");
    }

    fn on_error(&self, exit_code: Option<i32>, message: &str) {
        let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        self.bar
            .abandon_with_message(format!("failed ({}): {}", code, message));
    }
}

/// One-line summary such as `frame=120 fps=30 speed=1.2x`.
pub fn status_line(snapshot: &ProgressSnapshot) -> String {
    let mut parts = Vec::new();
    if let Some(frame) = snapshot.frame {
        parts.push(format!("frame={}", frame));
    }
    if let Some(fps) = snapshot.fps {
        parts.push(format!("fps={}", fps));
    }
    if let Some(time) = &snapshot.time {
        parts.push(format!("time={}", time));
    }
    if let Some(speed) = &snapshot.speed {
        parts.push(format!("speed={}", speed));
    }
    parts.join(" ")
}
