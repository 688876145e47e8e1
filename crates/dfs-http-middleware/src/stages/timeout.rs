//! Per-request deadline.
//!
//! Sets the context deadline and races the rest of the chain against it.
//! When the deadline passes first, the request's cancellation signal fires
//! and the client gets a `DEADLINE_EXCEEDED` envelope. An earlier deadline
//! already on the context wins over the configured duration.

use std::time::{Duration, Instant};

use dfs_http_core::{response, BoxFuture, Error, ErrorCode, Request, RequestContext, Response};

use crate::middleware::{Middleware, Next};

/// Bounds how long the inner chain may run.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    /// Allows `duration` per request.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Returns the configured duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let budget = ctx
                .remaining()
                .map_or(self.duration, |remaining| remaining.min(self.duration));
            ctx.set_deadline(Instant::now() + budget);

            let cancellation = ctx.cancellation().clone();
            let request_id = ctx.request_id().map(str::to_owned);
            match tokio::time::timeout(budget, next.run(ctx, request)).await {
                Ok(response) => response,
                Err(_) => {
                    cancellation.cancel();
                    tracing::warn!(
                        request_id = request_id.as_deref().unwrap_or("-"),
                        timeout_ms = budget.as_millis() as u64,
                        "request deadline exceeded"
                    );
                    let err = Error::new(ErrorCode::DeadlineExceeded, "request deadline exceeded");
                    response::error(&err, request_id.as_deref())
                }
            }
        })
    }
}
