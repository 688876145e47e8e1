//! Request metrics.
//!
//! Records one [`HttpMetric`] per request into the configured collector
//! and mirrors it to the `metrics` facade (request counter, latency
//! histogram, in-flight gauge).

use std::sync::Arc;
use std::time::Instant;

use dfs_http_core::{BoxFuture, Request, RequestContext, Response};
use dfs_http_telemetry::metrics::{record_request, InFlightGuard};
use dfs_http_telemetry::{HttpMetric, InMemoryCollector, MetricsCollector};

use crate::middleware::{Middleware, Next};

/// Records per-request metrics.
#[derive(Clone)]
pub struct MetricsMiddleware {
    collector: Arc<dyn MetricsCollector>,
}

impl MetricsMiddleware {
    /// Records into `collector`.
    #[must_use]
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self { collector }
    }

    /// Returns the collector.
    #[must_use]
    pub fn collector(&self) -> &Arc<dyn MetricsCollector> {
        &self.collector
    }
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryCollector::new()))
    }
}

impl std::fmt::Debug for MetricsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let _in_flight = InFlightGuard::new();
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let start = Instant::now();

            let response = next.run(ctx, request).await;

            let elapsed = start.elapsed();
            let status = response.status().as_u16();
            record_request(&method, &path, status, elapsed);
            self.collector.record_http(HttpMetric::new(
                method,
                path,
                status,
                elapsed.as_secs_f64() * 1000.0,
            ));
            response
        })
    }
}
