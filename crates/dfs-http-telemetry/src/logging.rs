//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber: an [`EnvFilter`] built from the
//! configured level, and a `fmt` layer writing either JSON (production) or
//! the pretty human format (development).
//!
//! # Example
//!
//! ```rust,ignore
//! use dfs_http_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(request_id = "abc", "server ready");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether to install a subscriber at all.
    pub enabled: bool,
    /// Filter directives, e.g. `info` or `dfs_http_server=debug,hyper=warn`.
    pub level: String,
    /// JSON lines instead of the pretty format.
    pub json_format: bool,
    /// Emit span open/close events.
    pub span_events: bool,
    /// Include file and line of the call site.
    pub file_line_info: bool,
    /// Include the module path.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable, verbose output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            include_target: true,
        }
    }

    /// JSON output at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            include_target: true,
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// `InvalidFilter` for a bad level string, `LoggingInit` if a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_target(config.include_target);

    let layer = if config.json_format {
        base.json().boxed()
    } else {
        base.pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parses filter directives.
///
/// # Errors
///
/// `InvalidFilter` when the directives do not parse.
pub fn create_env_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
}

/// Standard field names used in log events.
pub mod fields {
    /// Request ID.
    pub const REQUEST_ID: &str = "request_id";
    /// HTTP method.
    pub const METHOD: &str = "method";
    /// Request path.
    pub const PATH: &str = "path";
    /// Peer address.
    pub const REMOTE_ADDR: &str = "remote_addr";
    /// Response status code.
    pub const STATUS: &str = "status";
    /// Duration in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";
    /// Authenticated user id.
    pub const USER_ID: &str = "user_id";
    /// Transaction id.
    pub const TRANSACTION_ID: &str = "transaction_id";
    /// Error description.
    pub const ERROR: &str = "error";
}
