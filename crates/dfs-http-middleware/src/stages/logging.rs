//! Access logging.
//!
//! One event per request after the response is produced, with the level
//! chosen by status class: `error` for 5xx, `warn` for 4xx, `info` otherwise.

use std::time::Instant;

use dfs_http_core::{BoxFuture, Request, RequestContext, Response};
use http::StatusCode;

use crate::middleware::{Middleware, Next};

/// Logs method, path, peer, status, duration and request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware {
    _private: (),
}

impl LoggingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

/// Severity used for a response status.
#[must_use]
pub fn level_for_status(status: StatusCode) -> tracing::Level {
    if status.is_server_error() {
        tracing::Level::ERROR
    } else if status.is_client_error() {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started = Instant::now();
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            let response = next.run(ctx, request).await;

            let status = response.status();
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            let request_id = ctx.request_id().unwrap_or("-");
            let remote_addr = ctx
                .remote_addr()
                .map_or_else(|| "-".to_string(), |addr| addr.to_string());

            macro_rules! access_log {
                ($level:ident) => {
                    tracing::$level!(
                        request_id,
                        method = %method,
                        path = %path,
                        remote_addr = %remote_addr,
                        status = status.as_u16(),
                        duration_ms,
                        "request completed"
                    )
                };
            }

            let level = level_for_status(status);
            if level == tracing::Level::ERROR {
                access_log!(error);
            } else if level == tracing::Level::WARN {
                access_log!(warn);
            } else {
                access_log!(info);
            }

            response
        })
    }
}
