//! Bounded in-process metric history.
//!
//! The metrics middleware pushes one [`HttpMetric`] per request and the
//! system sampler pushes [`SystemMetric`]s. [`InMemoryCollector`] keeps the
//! most recent entries in ring buffers; once full, the oldest entry is
//! evicted. Readers always get copies.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Default HTTP history length.
pub const DEFAULT_HTTP_CAPACITY: usize = 1000;

/// Default system history length.
pub const DEFAULT_SYSTEM_CAPACITY: usize = 100;

/// One handled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpMetric {
    /// Request method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Response status.
    pub status_code: u16,
    /// Handling time in milliseconds.
    pub duration_ms: f64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
}

impl HttpMetric {
    /// Creates a metric stamped now.
    pub fn new(method: impl Into<String>, path: impl Into<String>, status_code: u16, duration_ms: f64) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status_code,
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// One host utilisation sample. Percentages are in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetric {
    /// CPU utilisation.
    pub cpu_percent: f64,
    /// Memory utilisation.
    pub memory_percent: f64,
    /// Disk utilisation.
    pub disk_percent: f64,
    /// Sample time.
    pub timestamp: DateTime<Utc>,
}

impl SystemMetric {
    /// Creates a sample stamped now.
    #[must_use]
    pub fn new(cpu_percent: f64, memory_percent: f64, disk_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            disk_percent,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate over the retained HTTP history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpSummary {
    /// Retained request count.
    pub requests: usize,
    /// Requests with status ≥ 500.
    pub server_errors: usize,
    /// Requests with status in 400..500.
    pub client_errors: usize,
    /// Mean duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Largest duration in milliseconds.
    pub max_duration_ms: f64,
}

/// Sink for request and system metrics.
pub trait MetricsCollector: Send + Sync + 'static {
    /// Records a handled request.
    fn record_http(&self, metric: HttpMetric);

    /// Records a system sample.
    fn record_system(&self, metric: SystemMetric);

    /// Copies the retained request history, oldest first.
    fn http_metrics(&self) -> Vec<HttpMetric>;

    /// Copies the retained system history, oldest first.
    fn system_metrics(&self) -> Vec<SystemMetric>;

    /// Summarises the retained request history.
    fn http_summary(&self) -> HttpSummary {
        summarize(&self.http_metrics())
    }
}

/// Ring-buffer collector.
#[derive(Debug)]
pub struct InMemoryCollector {
    http: RwLock<VecDeque<HttpMetric>>,
    system: RwLock<VecDeque<SystemMetric>>,
    http_capacity: usize,
    system_capacity: usize,
}

impl Default for InMemoryCollector {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HTTP_CAPACITY, DEFAULT_SYSTEM_CAPACITY)
    }
}

impl InMemoryCollector {
    /// Creates a collector with the default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector with explicit capacities, clamped to
    /// `1..=DEFAULT_HTTP_CAPACITY` and `1..=DEFAULT_SYSTEM_CAPACITY`.
    #[must_use]
    pub fn with_capacity(http_capacity: usize, system_capacity: usize) -> Self {
        let http_capacity = http_capacity.clamp(1, DEFAULT_HTTP_CAPACITY);
        let system_capacity = system_capacity.clamp(1, DEFAULT_SYSTEM_CAPACITY);
        Self {
            http: RwLock::new(VecDeque::with_capacity(http_capacity)),
            system: RwLock::new(VecDeque::with_capacity(system_capacity)),
            http_capacity,
            system_capacity,
        }
    }

    /// Drops all retained entries.
    pub fn clear(&self) {
        self.http.write().clear();
        self.system.write().clear();
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, capacity: usize, item: T) {
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

impl MetricsCollector for InMemoryCollector {
    fn record_http(&self, metric: HttpMetric) {
        push_bounded(&mut self.http.write(), self.http_capacity, metric);
    }

    fn record_system(&self, metric: SystemMetric) {
        push_bounded(&mut self.system.write(), self.system_capacity, metric);
    }

    fn http_metrics(&self) -> Vec<HttpMetric> {
        self.http.read().iter().cloned().collect()
    }

    fn system_metrics(&self) -> Vec<SystemMetric> {
        self.system.read().iter().cloned().collect()
    }

    fn http_summary(&self) -> HttpSummary {
        summarize(self.http.read().iter())
    }
}

fn summarize<'a>(metrics: impl IntoIterator<Item = &'a HttpMetric>) -> HttpSummary {
    let mut summary = HttpSummary::default();
    let mut total = 0.0;
    for metric in metrics {
        summary.requests += 1;
        match metric.status_code {
            500.. => summary.server_errors += 1,
            400..=499 => summary.client_errors += 1,
            _ => {}
        }
        total += metric.duration_ms;
        summary.max_duration_ms = summary.max_duration_ms.max(metric.duration_ms);
    }
    if summary.requests > 0 {
        summary.avg_duration_ms = total / summary.requests as f64;
    }
    summary
}
