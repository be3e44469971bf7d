//! Frame extraction.

use std::path::Path;

use tokio::fs;
use tracing::info;

use vframe_models::FrameExtractOptions;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::output_check::is_frame_name;
use crate::sink::ProgressSink;

/// Sampling rate as passed to the `fps` filter, without trailing zeros.
fn fps_value(fps: f64) -> String {
    format!("{}", fps)
}

/// The pattern must be a bare file name with a sequence placeholder, and the
/// files it produces must be recognisable to
/// [`has_frames`](crate::output_check::has_frames), otherwise a
/// finished job would never be detected as done.
fn validate_pattern(pattern: &str) -> MediaResult<()> {
    let bare = Path::new(pattern).file_name().and_then(|n| n.to_str()) == Some(pattern);
    if !bare {
        return Err(MediaError::InvalidOptions(format!(
            "frame pattern must be a file name, got '{}'",
            pattern
        )));
    }
    if !pattern.contains('%') {
        return Err(MediaError::InvalidOptions(format!(
            "frame pattern needs a sequence placeholder such as %06d, got '{}'",
            pattern
        )));
    }
    if !is_frame_name(pattern) {
        return Err(MediaError::InvalidOptions(format!(
            "frame pattern must contain 'frame' and end in .jpg, .jpeg or .png, got '{}'",
            pattern
        )));
    }
    Ok(())
}

/// Build the FFmpeg command sampling `input` into `output_dir`.
pub fn frame_extract_command(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &FrameExtractOptions,
) -> MediaResult<FfmpegCommand> {
    if !options.fps.is_finite() || options.fps <= 0.0 {
        return Err(MediaError::InvalidOptions(format!(
            "fps must be positive, got {}",
            options.fps
        )));
    }
    validate_pattern(&options.pattern)?;

    let output = output_dir.as_ref().join(&options.pattern);
    let mut cmd = FfmpegCommand::new(input, output)
        .video_filter(format!("fps={}", fps_value(options.fps)));
    if let Some(quality) = options.quality {
        cmd = cmd.image_quality(quality);
    }

    Ok(cmd)
}

/// Extract frames, creating the output directory first.
pub async fn extract_frames(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: &FrameExtractOptions,
    sink: &dyn ProgressSink,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    let cmd = frame_extract_command(input, output_dir, options)?;
    fs::create_dir_all(output_dir).await?;

    info!(
        input = %input.display(),
        output_dir = %output_dir.display(),
        fps = options.fps,
        "Extracting frames"
    );

    runner.run(&cmd, sink).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_extract_args() {
        let options = FrameExtractOptions::new(2.0);
        let args = frame_extract_command("in.mov", "/tmp/frames", &options)
            .unwrap()
            .build_args();

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "fps=2");
        assert_eq!(
            args.last().map(String::as_str),
            Some("/tmp/frames/frame_%06d.jpg")
        );
        assert!(!args.contains(&"-q:v".to_string()));
    }

    #[test]
    fn test_fractional_fps_and_quality() {
        let mut options = FrameExtractOptions::new(0.5);
        options.quality = Some(3);
        let args = frame_extract_command("in.mov", "out", &options)
            .unwrap()
            .build_args();

        assert!(args.contains(&"fps=0.5".to_string()));
        let q = args.iter().position(|a| a == "-q:v").unwrap();
        assert_eq!(args[q + 1], "3");
    }

    #[test]
    fn test_invalid_fps_rejected() {
        for fps in [0.0, -1.0, f64::NAN] {
            let options = FrameExtractOptions::new(fps);
            assert!(matches!(
                frame_extract_command("in.mov", "out", &options),
                Err(MediaError::InvalidOptions(_))
            ));
        }
    }

    #[test]
    fn test_unrecognised_patterns_rejected() {
        for pattern in [
            "",
            "img_%04d.jpg",
            "frame_%04d.webp",
            "frame.jpg",
            "sub/frame_%04d.jpg",
        ] {
            let mut options = FrameExtractOptions::new(1.0);
            options.pattern = pattern.to_string();
            assert!(
                matches!(
                    frame_extract_command("in.mov", "out", &options),
                    Err(MediaError::InvalidOptions(_))
                ),
                "pattern {:?} should be rejected",
                pattern
            );
        }
    }

    #[tokio::test]
    async fn test_accepted_pattern_output_is_detected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut options = FrameExtractOptions::new(1.0);
        options.pattern = "Frame-%04d.PNG".to_string();
        frame_extract_command("in.mov", dir.path(), &options).unwrap();

        std::fs::write(dir.path().join("Frame-0001.PNG"), b"").unwrap();
        assert!(crate::output_check::has_frames(dir.path()).await);
    }
}
