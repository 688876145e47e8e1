//! Built-in middleware stages.
//!
//! A typical chain, outermost first:
//!
//! 1. [`request_id`] - assign or propagate `X-Request-ID`
//! 2. [`logging`] - one access log line per request
//! 3. [`recovery`] - turn panics into `500` envelopes
//! 4. [`cors`] - CORS headers and preflight answers
//! 5. [`timeout`] - per-request deadline
//! 6. [`rate_limit`] - sliding-window limit per client
//! 7. [`metrics`] - request counters and history
//! 8. [`auth`] - bearer token authentication and permissions
//! 9. [`transaction`] - transaction boundaries for writes

pub mod auth;
pub mod cors;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;
pub mod timeout;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use auth::AuthMiddleware;
pub use cors::{CorsBuilder, CorsMiddleware};
pub use logging::LoggingMiddleware;
pub use metrics::MetricsMiddleware;
pub use rate_limit::{RateLimitBuilder, RateLimitMiddleware};
pub use recovery::RecoveryMiddleware;
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
pub use timeout::TimeoutMiddleware;
pub use transaction::TransactionMiddleware;
