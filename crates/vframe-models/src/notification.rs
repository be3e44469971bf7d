//! Webhook payload describing a job outcome.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobKind};

/// JSON body posted to the callback URL after each job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub input: String,
    pub output: String,
    pub success: bool,
    /// ISO-8601 timestamp
    pub timestamp: String,
    /// Output already existed and no work was done
    pub existing: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    /// Wall-clock seconds spent on the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    /// Frame images written by a frame extraction job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_extracted: Option<usize>,
}

impl NotificationPayload {
    fn base(job: &Job, success: bool, existing: bool, message: String) -> Self {
        Self {
            input: job.input_path.display().to_string(),
            output: job.output_path.display().to_string(),
            success,
            timestamp: format_timestamp(Utc::now()),
            existing,
            message,
            job_id: Some(job.id.clone()),
            kind: Some(job.kind()),
            processing_time: None,
            frames_extracted: None,
        }
    }

    /// Payload for a job that ran to completion.
    pub fn completed(job: &Job, processing_time: f64) -> Self {
        let mut payload = Self::base(job, true, false, format!("{} completed", job.kind()));
        payload.processing_time = Some(round_secs(processing_time));
        payload
    }

    /// Attach the number of frames a completed extraction wrote.
    pub fn with_frames_extracted(mut self, frames: Option<usize>) -> Self {
        self.frames_extracted = frames;
        self
    }

    /// Payload for a job skipped because its output already exists.
    pub fn existing(job: &Job) -> Self {
        Self::base(
            job,
            true,
            true,
            "Output already exists, skipped processing".to_string(),
        )
    }

    /// Payload for a failed job.
    pub fn failed(job: &Job, error: impl std::fmt::Display, processing_time: f64) -> Self {
        let mut payload = Self::base(job, false, false, error.to_string());
        payload.processing_time = Some(round_secs(processing_time));
        payload
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_payload() {
        let job = Job::frame_extract("a.mov", "/out", 2.0);
        let payload = NotificationPayload::existing(&job);

        assert!(payload.success);
        assert!(payload.existing);
        assert_eq!(payload.input, "a.mov");
        assert_eq!(payload.output, "/out");
        assert!(payload.processing_time.is_none());
    }

    #[test]
    fn test_wire_format() {
        let job = Job::transcode("in.mp4", "out.mp4");
        let payload = NotificationPayload::completed(&job, 12.3456);
        let value = serde_json::to_value(&payload).unwrap();

        for key in ["input", "output", "success", "timestamp", "existing", "message"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["processingTime"], 12.35);
        assert_eq!(value["kind"], "transcode");
        assert!(value.get("framesExtracted").is_none());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_failed_payload_carries_message() {
        let job = Job::transcode("in.mp4", "out.mp4");
        let payload = NotificationPayload::failed(&job, "FFmpeg exited with code 1", 0.5);
        assert!(!payload.success);
        assert!(!payload.existing);
        assert_eq!(payload.message, "FFmpeg exited with code 1");
    }

    #[test]
    fn test_frames_extracted_on_wire() {
        let job = Job::frame_extract("a.mov", "/out", 2.0);
        let payload = NotificationPayload::completed(&job, 3.0).with_frames_extracted(Some(42));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["framesExtracted"], 42);
        assert_eq!(value["output"], "/out");
    }
}
