//! FFmpeg progress parsing.
//!
//! FFmpeg invoked with `-progress pipe:1` writes blocks of `key=value` lines to
//! stdout, each block terminated by `progress=continue` or, for the last one,
//! `progress=end`. [`ProgressParser`] folds those lines into a
//! [`ProgressSnapshot`]; [`progress_events`] turns a whole stream into a lazy
//! sequence of [`ProgressEvent`]s.

use futures_util::stream::{self, Stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, trace};

use vframe_models::{parse_media_time, ProgressSnapshot};

/// Sentinel value of the `progress` key marking the final block.
pub const PROGRESS_END: &str = "end";

/// Result of feeding a block terminator to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// `progress=<anything but end>`
    Progress(ProgressSnapshot),
    /// `progress=end`, percent forced to 100
    End(ProgressSnapshot),
}

/// Event yielded by [`progress_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Intermediate or final progress with the accumulated snapshot
    Progress(ProgressSnapshot),
    /// Stream reached `progress=end`; always preceded by a final `Progress`
    Complete(ProgressSnapshot),
}

/// Incremental parser for the `key=value` progress protocol.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration: Option<f64>,
    snapshot: ProgressSnapshot,
    finished: bool,
}

impl ProgressParser {
    /// Create a parser. `duration` is the media length in seconds; without it
    /// percent stays at 0 until `progress=end`.
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration: duration.filter(|d| d.is_finite() && *d > 0.0),
            ..Default::default()
        }
    }

    /// Latest accumulated snapshot.
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    /// Whether `progress=end` has been seen. Later lines are ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one line of process output.
    ///
    /// Returns an update only for `progress=` lines. Lines without `=`,
    /// unknown keys and unparseable values leave the snapshot untouched.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        if self.finished {
            return None;
        }

        let Some((key, value)) = line.trim().split_once('=') else {
            trace!("Skipping malformed progress line: {:?}", line);
            return None;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.snapshot.frame = Some(frame);
                }
            }
            "fps" => {
                if let Some(fps) = parse_float(value) {
                    self.snapshot.fps = Some(fps);
                }
            }
            "size" | "total_size" => {
                if let Some(size) = available(value) {
                    self.snapshot.size = Some(size.to_string());
                }
            }
            "time" | "out_time" => self.apply_time(value),
            "bitrate" => {
                if let Some(bitrate) = available(value) {
                    self.snapshot.bitrate = Some(bitrate.to_string());
                }
            }
            "speed" => {
                if let Some(speed) = available(value) {
                    self.snapshot.speed = Some(speed.to_string());
                }
            }
            "progress" => return Some(self.finish_block(value)),
            _ if is_quantizer_key(key) => {
                if let Some(q) = parse_float(value) {
                    self.snapshot.q = Some(q);
                }
            }
            _ => {}
        }

        None
    }

    fn apply_time(&mut self, value: &str) {
        // Negative and N/A times show up before the first frame is muxed
        let Ok(elapsed) = parse_media_time(value) else {
            return;
        };

        self.snapshot.time = Some(value.to_string());
        self.snapshot.elapsed_secs = Some(elapsed);

        if let Some(duration) = self.duration {
            let percent = ((elapsed / duration) * 100.0).round().clamp(0.0, 100.0) as u8;
            self.snapshot.percent = self.snapshot.percent.max(percent);
        }
    }

    fn finish_block(&mut self, value: &str) -> ProgressUpdate {
        if value == PROGRESS_END {
            self.finished = true;
            self.snapshot.percent = 100;
            ProgressUpdate::End(self.snapshot.clone())
        } else {
            ProgressUpdate::Progress(self.snapshot.clone())
        }
    }
}

/// Plain `q`, or FFmpeg's per-stream `stream_0_0_q`.
fn is_quantizer_key(key: &str) -> bool {
    key == "q" || (key.starts_with("stream_") && key.ends_with("_q"))
}

fn available(value: &str) -> Option<&str> {
    if value.is_empty() || value.eq_ignore_ascii_case("N/A") {
        None
    } else {
        Some(value)
    }
}

fn parse_float(value: &str) -> Option<f64> {
    available(value)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

struct EventState<R> {
    reader: R,
    buf: Vec<u8>,
    parser: ProgressParser,
    pending: Option<ProgressEvent>,
}

/// Read one `\n`-terminated line as lossy UTF-8. `Ok(None)` at EOF.
pub(crate) async fn read_lossy_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Turn a line-oriented progress stream into a lazy sequence of events.
///
/// The sequence ends when the reader reaches EOF. Lines after `progress=end`
/// and lines that are not valid UTF-8 are drained but produce nothing, so the
/// writer never blocks on a full pipe or dies on a closed one.
pub fn progress_events<R>(reader: R, duration: Option<f64>) -> impl Stream<Item = ProgressEvent>
where
    R: AsyncBufRead + Unpin,
{
    let state = EventState {
        reader,
        buf: Vec::new(),
        parser: ProgressParser::new(duration),
        pending: None,
    };

    stream::unfold(state, |mut state| async move {
        if let Some(event) = state.pending.take() {
            return Some((event, state));
        }

        loop {
            match read_lossy_line(&mut state.reader, &mut state.buf).await {
                Ok(Some(line)) => match state.parser.feed_line(&line) {
                    Some(ProgressUpdate::Progress(snapshot)) => {
                        return Some((ProgressEvent::Progress(snapshot), state));
                    }
                    Some(ProgressUpdate::End(snapshot)) => {
                        state.pending = Some(ProgressEvent::Complete(snapshot.clone()));
                        return Some((ProgressEvent::Progress(snapshot), state));
                    }
                    None => continue,
                },
                Ok(None) => return None,
                Err(e) => {
                    debug!("Progress stream read error, stopping: {}", e);
                    return None;
                }
            }
        }
    })
}
