//! Media processing for a single job.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use vframe_media::{
    count_frames, extract_frames, probe_duration, transcode, FfmpegRunner, ProgressSink,
};
use vframe_models::{Job, JobOptions};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// What a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Frame images in the output directory after extraction
    pub frames_extracted: Option<usize>,
}

/// Runs the external work for a job once it has been admitted.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn process(&self, job: &Job, sink: &dyn ProgressSink) -> WorkerResult<ProcessReport>;
}

/// Processor backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Option<Duration>,
}

impl FfmpegProcessor {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            timeout: None,
        }
    }

    /// Kill FFmpeg runs that exceed `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path).with_timeout(config.process_timeout)
    }

    fn runner(&self, duration: Option<f64>) -> FfmpegRunner {
        FfmpegRunner::new()
            .with_program(&self.ffmpeg_path)
            .with_duration(duration)
            .with_timeout(self.timeout)
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn process(&self, job: &Job, sink: &dyn ProgressSink) -> WorkerResult<ProcessReport> {
        // No duration just means indeterminate percent
        let duration = probe_duration(&self.ffprobe_path, &job.input_path).await;
        let runner = self.runner(duration);

        match &job.options {
            JobOptions::Transcode(options) => {
                transcode(&runner, &job.input_path, &job.output_path, options, sink).await?;
                Ok(ProcessReport::default())
            }
            JobOptions::FrameExtract(options) => {
                extract_frames(&runner, &job.input_path, &job.output_path, options, sink).await?;
                let frames = count_frames(&job.output_path).await;
                info!(job_id = %job.id, frames, "Frames written");
                Ok(ProcessReport {
                    frames_extracted: Some(frames),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vframe_media::{MediaError, NullProgressSink};

    use crate::error::WorkerError;

    #[tokio::test]
    async fn test_missing_ffmpeg_is_media_error() {
        let processor = FfmpegProcessor::new("/no/such/ffmpeg", "/no/such/ffprobe");
        let job = Job::transcode("in.mov", "out.mp4");

        let err = processor.process(&job, &NullProgressSink).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Media(MediaError::FfmpegNotFound(_))
        ));
    }

    #[test]
    fn test_from_config_uses_paths() {
        let config = WorkerConfig {
            ffmpeg_path: "/opt/ffmpeg".to_string(),
            process_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let processor = FfmpegProcessor::from_config(&config);
        let runner = processor.runner(None);
        assert_eq!(runner.program(), "/opt/ffmpeg");
        assert_eq!(runner.timeout(), Some(Duration::from_secs(60)));
    }
}
