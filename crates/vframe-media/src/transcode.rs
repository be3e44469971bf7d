//! Transcoding.

use std::path::Path;

use tokio::fs;
use tracing::info;

use vframe_models::TranscodeOptions;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::sink::ProgressSink;

/// Build the FFmpeg command transcoding `input` into `output`.
///
/// Unset options are left to FFmpeg's defaults for the output container.
pub fn transcode_command(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &TranscodeOptions,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);

    if let Some(codec) = &options.video_codec {
        cmd = cmd.video_codec(codec);
    }
    if let Some(crf) = options.crf {
        cmd = cmd.crf(crf);
    }
    if let Some(preset) = &options.preset {
        cmd = cmd.preset(preset);
    }
    if let Some(codec) = &options.audio_codec {
        cmd = cmd.audio_codec(codec);
    }

    cmd.output_args(options.extra_args.iter().cloned())
}

/// Transcode a file, creating the output's parent directory first.
pub async fn transcode(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &TranscodeOptions,
    sink: &dyn ProgressSink,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        codec = options.video_codec.as_deref().unwrap_or("default"),
        "Transcoding"
    );

    let cmd = transcode_command(input, output, options);
    runner.run(&cmd, sink).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transcode_args() {
        let args = transcode_command("in.mov", "out.mp4", &TranscodeOptions::default()).build_args();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(&args[input..], &["-i", "in.mov", "out.mp4"]);
    }

    #[test]
    fn test_transcode_options_applied_in_order() {
        let options = TranscodeOptions {
            video_codec: Some("libx264".to_string()),
            audio_codec: Some("aac".to_string()),
            crf: Some(23),
            preset: Some("fast".to_string()),
            extra_args: vec!["-movflags".to_string(), "+faststart".to_string()],
        };
        let args = transcode_command("in.mov", "out.mp4", &options).build_args();
        let input = args.iter().position(|a| a == "-i").unwrap();

        assert_eq!(
            &args[input + 2..],
            &[
                "-c:v", "libx264", "-crf", "23", "-preset", "fast", "-c:a", "aac", "-movflags",
                "+faststart", "out.mp4"
            ]
        );
    }
}
