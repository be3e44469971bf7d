//! Job outcome webhooks.
//!
//! Delivery is best effort: one attempt, bounded by a timeout, failures logged
//! and dropped. A notification never changes a job's outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use vframe_models::{Job, NotificationPayload};

use crate::config::WorkerConfig;
use crate::error::{NotifyError, NotifyResult, WorkerError, WorkerResult};
use crate::metrics;

/// Transport for notification payloads.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn notify(&self, url: &Url, payload: &NotificationPayload) -> NotifyResult<()>;
}

/// POSTs payloads as JSON.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> NotifyResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JobNotifier for WebhookNotifier {
    async fn notify(&self, url: &Url, payload: &NotificationPayload) -> NotifyResult<()> {
        let response = self.client.post(url.clone()).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Resolves the callback target for a job and delivers its payload.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn JobNotifier>,
    default_url: Option<Url>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn JobNotifier>, default_url: Option<Url>) -> Self {
        Self {
            notifier,
            default_url,
        }
    }

    /// Webhook dispatcher using the configured URL and timeout.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let notifier = WebhookNotifier::new(config.notify_timeout).map_err(|e| {
            WorkerError::config_error(format!("Failed to build webhook client: {}", e))
        })?;
        Ok(Self::new(Arc::new(notifier), config.callback_url.clone()))
    }

    /// The job's own callback URL, else the configured default.
    pub fn target_for<'a>(&'a self, job: &'a Job) -> Option<&'a Url> {
        job.callback_url.as_ref().or(self.default_url.as_ref())
    }

    /// Send a payload for `job`. Returns whether it was delivered.
    pub async fn dispatch(&self, job: &Job, payload: &NotificationPayload) -> bool {
        let Some(url) = self.target_for(job) else {
            debug!(job_id = %job.id, "No callback URL configured, skipping notification");
            metrics::record_notification("skipped");
            return false;
        };

        let started = Instant::now();
        match self.notifier.notify(url, payload).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    url = %url,
                    success = payload.success,
                    existing = payload.existing,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Notification sent"
                );
                metrics::record_notification("sent");
                true
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    url = %url,
                    "Notification failed: {}", e
                );
                metrics::record_notification("failed");
                false
            }
        }
    }
}
