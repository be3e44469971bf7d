//! Host memory monitoring and admission control.
//!
//! The monitor is advisory: it gates whether the *next* job may start and
//! never touches work already running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use sysinfo::System;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use vframe_models::MemoryReading;

use crate::config::WorkerConfig;
use crate::metrics;

/// Source of memory readings.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemoryReading;
}

/// Reads host memory through `sysinfo`. Free memory is what the kernel
/// reports as available, which includes reclaimable caches.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&self) -> MemoryReading {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_memory();
        MemoryReading::from_total_and_free(system.total_memory(), system.available_memory())
    }
}

/// Handler for readings above the threshold.
pub type HighMemoryCallback = dyn Fn(&MemoryReading) -> anyhow::Result<()> + Send + Sync;

struct MonitorInner {
    probe: Arc<dyn MemoryProbe>,
    threshold_percent: f64,
    sample_interval: Duration,
    callbacks: Mutex<Vec<Arc<HighMemoryCallback>>>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let sampler = self.sampler.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = sampler.take() {
            handle.abort();
        }
    }
}

/// Samples memory usage, runs high-memory callbacks and answers admission
/// questions. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryMonitor {
    inner: Arc<MonitorInner>,
}

impl MemoryMonitor {
    /// Monitor host memory with the given threshold and sampling period.
    pub fn new(threshold_percent: f64, sample_interval: Duration) -> Self {
        Self::with_probe(
            Arc::new(SystemMemoryProbe::new()),
            threshold_percent,
            sample_interval,
        )
    }

    /// Monitor host memory using worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.memory_threshold_percent, config.memory_sample_interval)
    }

    /// Monitor with a custom reading source.
    pub fn with_probe(
        probe: Arc<dyn MemoryProbe>,
        threshold_percent: f64,
        sample_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                threshold_percent,
                sample_interval: sample_interval.max(Duration::from_millis(1)),
                callbacks: Mutex::new(Vec::new()),
                sampler: Mutex::new(None),
            }),
        }
    }

    pub fn threshold_percent(&self) -> f64 {
        self.inner.threshold_percent
    }

    /// Fresh reading; never cached.
    pub fn get_usage(&self) -> MemoryReading {
        let reading = self.inner.probe.sample();
        metrics::set_memory_usage(reading.usage_percent);
        reading
    }

    /// Whether a reading is above the threshold.
    pub fn exceeds_threshold(&self, reading: &MemoryReading) -> bool {
        reading.usage_percent > self.inner.threshold_percent
    }

    /// Whether usage is at or below the threshold right now.
    pub fn is_memory_available(&self) -> bool {
        !self.exceeds_threshold(&self.get_usage())
    }

    /// Register a handler run on every sample above the threshold.
    ///
    /// Handlers run one after another in registration order. An error or a
    /// panic in one is logged and does not stop the others.
    pub fn on_high_memory<F>(&self, callback: F)
    where
        F: Fn(&MemoryReading) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Take one sample and fire callbacks if it is above the threshold.
    pub fn check_now(&self) -> MemoryReading {
        self.inner.check_once()
    }

    /// Start periodic sampling. Calling it again while running is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_monitoring(&self) {
        let mut sampler = self
            .inner
            .sampler
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if sampler.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Memory monitoring already running");
            return;
        }

        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let period = self.inner.sample_interval;
        info!(
            threshold_percent = self.inner.threshold_percent,
            interval_secs = period.as_secs_f64(),
            "Starting memory monitoring"
        );

        *sampler = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.check_once();
            }
        }));
    }

    /// Stop periodic sampling if it is running.
    pub fn stop_monitoring(&self) {
        let handle = self
            .inner
            .sampler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Stopped memory monitoring");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner
            .sampler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Poll until usage is at or below the threshold.
    ///
    /// Returns `false` if `max_wait` elapses first. The first check happens
    /// immediately, so an idle host admits without waiting.
    pub async fn wait_until_available(&self, max_wait: Duration, poll_interval: Duration) -> bool {
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let deadline = Instant::now() + max_wait;
        let mut logged = false;

        loop {
            let reading = self.get_usage();
            if !self.exceeds_threshold(&reading) {
                if logged {
                    info!(
                        usage_percent = reading.usage_percent,
                        "Memory available again"
                    );
                }
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    usage_percent = reading.usage_percent,
                    threshold_percent = self.inner.threshold_percent,
                    waited_secs = max_wait.as_secs(),
                    "Memory still above threshold, giving up"
                );
                return false;
            }

            if !logged {
                info!(
                    usage_percent = reading.usage_percent,
                    threshold_percent = self.inner.threshold_percent,
                    "Memory above threshold, waiting"
                );
                logged = true;
            }

            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}

impl MonitorInner {
    fn check_once(&self) -> MemoryReading {
        let reading = self.probe.sample();
        metrics::set_memory_usage(reading.usage_percent);

        if reading.usage_percent <= self.threshold_percent {
            debug!(usage_percent = reading.usage_percent, "Memory sample");
            return reading;
        }

        warn!(
            usage_percent = reading.usage_percent,
            threshold_percent = self.threshold_percent,
            used = reading.used,
            total = reading.total,
            "High memory usage"
        );

        // Snapshot so a callback may register another without deadlocking
        let callbacks: Vec<Arc<HighMemoryCallback>> = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(&reading))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(callback = index, "High-memory callback failed: {:#}", e),
                Err(_) => warn!(callback = index, "High-memory callback panicked"),
            }
        }

        reading
    }
}
