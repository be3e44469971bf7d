//! Host memory readings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single host memory sample. Recomputed on every read, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryReading {
    /// Total physical memory in bytes
    pub total: u64,
    /// Memory available for new allocations in bytes
    pub free: u64,
    /// `total - free` in bytes
    pub used: u64,
    /// Used share of total memory (0-100)
    pub usage_percent: f64,
}

impl MemoryReading {
    /// Build a reading from total and free bytes.
    ///
    /// A zero total yields 0% usage.
    pub fn from_total_and_free(total: u64, free: u64) -> Self {
        let free = free.min(total);
        let used = total - free;
        let usage_percent = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };

        Self {
            total,
            free,
            used,
            usage_percent,
        }
    }
}
