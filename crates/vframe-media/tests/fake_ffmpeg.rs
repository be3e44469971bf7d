//! End-to-end runner tests against a scripted stand-in for FFmpeg.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tempfile::TempDir;
use vframe_media::{
    extract_frames, has_frames, FfmpegCommand, FfmpegRunner, MediaError, ProgressSink,
};
use vframe_models::{FrameExtractOptions, ProgressSnapshot};

#[derive(Default)]
struct RecordingSink {
    progress: Mutex<Vec<u8>>,
    completed: Mutex<u32>,
    errors: Mutex<Vec<Option<i32>>>,
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.progress.lock().unwrap().push(snapshot.percent);
    }

    fn on_complete(&self, _snapshot: &ProgressSnapshot) {
        *self.completed.lock().unwrap() += 1;
    }

    fn on_error(&self, exit_code: Option<i32>, _message: &str) {
        self.errors.lock().unwrap().push(exit_code);
    }
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Write a shell script that records its arguments, drops a frame image next
/// to its last argument, prints two progress blocks and exits with `code`.
fn fake_ffmpeg(dir: &Path, code: i32) -> (PathBuf, PathBuf) {
    let script = dir.join("ffmpeg");
    let args_file = dir.join("args.txt");
    let body = format!(
        r#"#!/bin/sh
printf '%s\n' "$@" > "{args}"
for last; do :; done
out_dir=$(dirname "$last")
mkdir -p "$out_dir"
: > "$out_dir/frame_000001.jpg"
echo "frame=1"
echo "out_time=00:00:01.000000"
echo "progress=continue"
echo "frame=2"
echo "out_time=00:00:02.000000"
echo "progress=end"
echo "simulated encoder message" >&2
exit {code}
"#,
        args = args_file.display(),
        code = code
    );
    write_script(&script, &body);
    (script, args_file)
}

#[tokio::test]
async fn test_frame_extract_reaches_completion() {
    let work = TempDir::new().unwrap();
    let (script, args_file) = fake_ffmpeg(work.path(), 0);
    let out_dir = work.path().join("frames");

    let runner = FfmpegRunner::new()
        .with_program(script.to_string_lossy())
        .with_duration(Some(2.0));
    let sink = RecordingSink::default();

    extract_frames(
        &runner,
        work.path().join("a.mov"),
        &out_dir,
        &FrameExtractOptions::new(2.0),
        &sink,
    )
    .await
    .unwrap();

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert!(args.contains(&"fps=2"));
    assert!(args.windows(2).any(|w| w == ["-progress", "pipe:1"]));
    assert!(args.windows(2).any(|w| w == ["-loglevel", "error"]));

    assert_eq!(*sink.progress.lock().unwrap(), vec![50, 100]);
    assert_eq!(*sink.completed.lock().unwrap(), 1);
    assert!(sink.errors.lock().unwrap().is_empty());
    assert!(has_frames(&out_dir).await);
}

#[tokio::test]
async fn test_nonzero_exit_is_failure_with_stderr() {
    let work = TempDir::new().unwrap();
    let (script, _) = fake_ffmpeg(work.path(), 3);

    let runner = FfmpegRunner::new().with_program(script.to_string_lossy());
    let sink = RecordingSink::default();
    let cmd = FfmpegCommand::new("in.mov", work.path().join("out.mp4"));

    let err = runner.run(&cmd, &sink).await.unwrap_err();
    match err {
        MediaError::FfmpegFailed {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, Some(3));
            assert!(stderr.unwrap().contains("simulated encoder message"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Progress was still streamed, but the run ended in error, not completion
    assert_eq!(sink.progress.lock().unwrap().len(), 2);
    assert_eq!(*sink.completed.lock().unwrap(), 0);
    assert_eq!(*sink.errors.lock().unwrap(), vec![Some(3)]);
}

#[tokio::test]
async fn test_invalid_utf8_output_does_not_fail_run() {
    let work = TempDir::new().unwrap();
    let script = work.path().join("ffmpeg");
    // Enough output after the bad bytes to overflow a pipe that is not drained
    write_script(
        &script,
        r#"#!/bin/sh
echo "frame=1"
printf '\377\376\n'
printf 'bad \377 stderr\n' >&2
i=0
while [ $i -lt 20000 ]; do
  echo "frame=$i"
  i=$((i+1))
done
echo "progress=end"
exit 0
"#,
    );

    let runner = FfmpegRunner::new().with_program(script.to_string_lossy());
    let sink = RecordingSink::default();
    let cmd = FfmpegCommand::new("in.mov", work.path().join("out.mp4"));

    let snapshot = runner.run(&cmd, &sink).await.unwrap();
    assert_eq!(snapshot.frame, Some(19999));
    assert_eq!(snapshot.percent, 100);
    assert_eq!(*sink.completed.lock().unwrap(), 1);
    assert!(sink.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_kills_process() {
    let work = TempDir::new().unwrap();
    let script = work.path().join("ffmpeg");
    write_script(
        &script,
        "#!/bin/sh\necho \"frame=1\"\necho \"progress=continue\"\nexec sleep 30\n",
    );

    let runner = FfmpegRunner::new()
        .with_program(script.to_string_lossy())
        .with_timeout(Some(Duration::from_millis(300)));
    let sink = RecordingSink::default();
    let cmd = FfmpegCommand::new("in.mov", work.path().join("out.mp4"));

    let started = std::time::Instant::now();
    let err = runner.run(&cmd, &sink).await.unwrap_err();
    assert!(matches!(err, MediaError::Timeout(_)));
    assert!(err.is_process_failure());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(*sink.errors.lock().unwrap(), vec![None]);
    assert_eq!(*sink.completed.lock().unwrap(), 0);
}
