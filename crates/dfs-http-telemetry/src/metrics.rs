//! Metric emission through the `metrics` facade.
//!
//! Nothing here installs a recorder; without one every call is a no-op, so
//! the embedding process decides where the numbers go.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `dfs_http_requests_total` | Counter | `method`, `path`, `status` |
//! | `dfs_http_request_duration_seconds` | Histogram | `method`, `path` |
//! | `dfs_http_in_flight_requests` | Gauge | - |
//! | `dfs_http_rate_limited_total` | Counter | - |
//! | `dfs_system_cpu_percent` | Gauge | - |
//! | `dfs_system_memory_percent` | Gauge | - |
//! | `dfs_system_disk_percent` | Gauge | - |

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::collector::SystemMetric;

/// Request counter.
pub const REQUESTS_TOTAL: &str = "dfs_http_requests_total";
/// Request latency histogram.
pub const REQUEST_DURATION_SECONDS: &str = "dfs_http_request_duration_seconds";
/// In-flight gauge.
pub const IN_FLIGHT_REQUESTS: &str = "dfs_http_in_flight_requests";
/// Rejections by the rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "dfs_http_rate_limited_total";

/// Registers descriptions for every metric above with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests handled");
    describe_histogram!(REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_gauge!(IN_FLIGHT_REQUESTS, "HTTP requests currently being handled");
    describe_counter!(RATE_LIMITED_TOTAL, "Requests rejected by the rate limiter");
    describe_gauge!("dfs_system_cpu_percent", "Host CPU utilisation");
    describe_gauge!("dfs_system_memory_percent", "Host memory utilisation");
    describe_gauge!("dfs_system_disk_percent", "Host disk utilisation");
}

/// Records a completed request.
pub fn record_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Counts a rate-limited request.
pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

/// Publishes a system sample as gauges.
pub fn record_system(sample: &SystemMetric) {
    gauge!("dfs_system_cpu_percent").set(sample.cpu_percent);
    gauge!("dfs_system_memory_percent").set(sample.memory_percent);
    gauge!("dfs_system_disk_percent").set(sample.disk_percent);
}

/// Holds the in-flight gauge up for as long as it lives.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission_without_recorder_is_noop() {
        describe_metrics();
        record_request("GET", "/health", 200, Duration::from_millis(3));
        record_rate_limited();
        record_system(&SystemMetric::new(1.0, 2.0, 3.0));
        let guard = InFlightGuard::new();
        drop(guard);
    }
}
