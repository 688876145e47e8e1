//! Observability for DFS HTTP services.
//!
//! - **Logging**: [`init_logging`] installs a `tracing-subscriber` stack
//!   (env filter plus JSON or pretty formatting)
//! - **Metrics**: [`metrics`] emits counters, histograms and gauges through
//!   the `metrics` facade; no exporter is bundled
//! - **History**: [`MetricsCollector`] and the ring-buffer
//!   [`InMemoryCollector`] keep recent request and host samples for status
//!   endpoints
//! - **Sampling**: [`spawn_system_sampler`] drives a [`SystemSampler`] on
//!   an interval
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dfs_http_telemetry::{HttpMetric, InMemoryCollector, MetricsCollector};
//!
//! let collector = Arc::new(InMemoryCollector::new());
//! collector.record_http(HttpMetric::new("GET", "/health", 200, 1.2));
//! assert_eq!(collector.http_summary().requests, 1);
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod collector;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod sampler;

pub use collector::{HttpMetric, HttpSummary, InMemoryCollector, MetricsCollector, SystemMetric};
pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig};
pub use sampler::{spawn_system_sampler, FixedSampler, SamplerHandle, SystemSampler};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
