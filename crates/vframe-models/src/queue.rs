//! Queue status reported to pollers and health checks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Read-only view of the executor queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Whether a job is currently executing
    pub busy: bool,
    /// Jobs waiting behind the current one
    pub queue_length: usize,
    /// Description of the executing job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}
