//! Periodic host utilisation sampling.
//!
//! How CPU, memory and disk are measured is platform specific and lives
//! behind [`SystemSampler`]. [`spawn_system_sampler`] drives a sampler on a
//! fixed interval and records each reading into a collector and the
//! `metrics` facade.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::collector::{MetricsCollector, SystemMetric};
use crate::TelemetryResult;

/// Source of host utilisation readings.
pub trait SystemSampler: Send + Sync + 'static {
    /// Takes one reading.
    fn sample(&self) -> TelemetryResult<SystemMetric>;
}

/// Sampler returning fixed readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSampler {
    /// Reported CPU utilisation.
    pub cpu_percent: f64,
    /// Reported memory utilisation.
    pub memory_percent: f64,
    /// Reported disk utilisation.
    pub disk_percent: f64,
}

impl FixedSampler {
    /// Creates a sampler that always reports these values.
    #[must_use]
    pub const fn new(cpu_percent: f64, memory_percent: f64, disk_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            disk_percent,
        }
    }
}

impl SystemSampler for FixedSampler {
    fn sample(&self) -> TelemetryResult<SystemMetric> {
        Ok(SystemMetric::new(
            self.cpu_percent,
            self.memory_percent,
            self.disk_percent,
        ))
    }
}

/// Running sampler task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct SamplerHandle {
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stops sampling.
    pub fn stop(self) {
        drop(self);
    }

    /// Returns `true` once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a task sampling every `interval`. Must be called inside a tokio runtime.
///
/// Failed readings are logged and skipped.
pub fn spawn_system_sampler(
    sampler: Arc<dyn SystemSampler>,
    collector: Arc<dyn MetricsCollector>,
    interval: Duration,
) -> SamplerHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sampler.sample() {
                Ok(sample) => {
                    crate::metrics::record_system(&sample);
                    collector.record_system(sample);
                }
                Err(e) => tracing::warn!(error = %e, "system sampling failed"),
            }
        }
    });
    SamplerHandle { task }
}
