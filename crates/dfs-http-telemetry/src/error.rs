//! Telemetry error types.

use thiserror::Error;

/// Errors raised while setting up or feeding telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A filter directive did not parse.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// A system sampler could not read its source.
    #[error("Failed to sample system metrics: {0}")]
    Sampling(String),
}
