//! Per-client rate limiting.
//!
//! Each client key keeps a sliding log of request timestamps. A request is
//! rejected with `429 Too Many Requests` once the log holds `limit` entries
//! younger than `window`.
//!
//! The client key is the first entry of `X-Forwarded-For`, then
//! `X-Real-IP`, then the peer address.
//!
//! # Example
//!
//! ```
//! use dfs_http_middleware::stages::RateLimitMiddleware;
//! use std::time::Duration;
//!
//! let rate_limit = RateLimitMiddleware::builder()
//!     .limit(100)
//!     .window(Duration::from_secs(60))
//!     .build();
//! assert_eq!(rate_limit.limit(), 100);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dfs_http_core::{response, BoxFuture, Error, Request, RequestContext, Response};
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::middleware::{Middleware, Next};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
    /// Proxy-provided client chain.
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
    /// Proxy-provided client address.
    pub const REAL_IP: &str = "x-real-ip";
}

/// Default requests per window.
pub const DEFAULT_LIMIT: usize = 100;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

type Log = HashMap<String, VecDeque<Instant>>;

enum Decision {
    Allowed { remaining: usize },
    Limited { retry_after: u64 },
}

/// Builder for [`RateLimitMiddleware`].
#[derive(Debug, Clone)]
pub struct RateLimitBuilder {
    limit: usize,
    window: Duration,
    sweep_interval: Option<Duration>,
}

impl Default for RateLimitBuilder {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            sweep_interval: None,
        }
    }
}

impl RateLimitBuilder {
    /// Creates a builder with the defaults (100 per minute).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of requests allowed per window.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the window length.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets how often idle keys are swept. Defaults to the window length.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Builds the middleware.
    ///
    /// The sweeper task starts only when a tokio runtime is running.
    #[must_use]
    pub fn build(self) -> RateLimitMiddleware {
        let log: Arc<Mutex<Log>> = Arc::default();
        let interval = self.sweep_interval.unwrap_or(self.window);
        let sweeper = spawn_sweeper(Arc::downgrade(&log), self.window, interval);
        RateLimitMiddleware {
            limit: self.limit,
            window: self.window,
            log,
            sweeper,
        }
    }
}

fn spawn_sweeper(log: Weak<Mutex<Log>>, window: Duration, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let Some(log) = log.upgrade() else { break };
            let removed = sweep(&mut log.lock(), Instant::now(), window);
            if removed > 0 {
                tracing::debug!(removed, "rate limit keys swept");
            }
        }
    }))
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps
        .front()
        .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
    {
        timestamps.pop_front();
    }
}

fn sweep(log: &mut Log, now: Instant, window: Duration) -> usize {
    let before = log.len();
    log.retain(|_, timestamps| {
        prune(timestamps, now, window);
        !timestamps.is_empty()
    });
    before - log.len()
}

/// Sliding-log rate limiter.
pub struct RateLimitMiddleware {
    limit: usize,
    window: Duration,
    log: Arc<Mutex<Log>>,
    sweeper: Option<JoinHandle<()>>,
}

impl RateLimitMiddleware {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> RateLimitBuilder {
        RateLimitBuilder::new()
    }

    /// Creates a limiter allowing `limit` requests per `window`.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::builder().limit(limit).window(window).build()
    }

    /// Returns the configured limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Number of tracked client keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.log.lock().len()
    }

    /// Drops expired timestamps and idle keys. Returns the keys removed.
    pub fn sweep(&self) -> usize {
        sweep(&mut self.log.lock(), Instant::now(), self.window)
    }

    fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut log = self.log.lock();
        let timestamps = log.entry(key.to_string()).or_default();
        prune(timestamps, now, self.window);

        if timestamps.len() >= self.limit {
            let age = timestamps
                .front()
                .map_or(Duration::ZERO, |oldest| now.saturating_duration_since(*oldest));
            let wait = self.window.saturating_sub(age);
            let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            return Decision::Limited {
                retry_after: retry_after.max(1),
            };
        }

        timestamps.push_back(now);
        Decision::Allowed {
            remaining: self.limit - timestamps.len(),
        }
    }
}

impl Default for RateLimitMiddleware {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Drop for RateLimitMiddleware {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for RateLimitMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitMiddleware")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("sweeper", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

/// Returns the rate limit key for a request.
#[must_use]
pub fn client_key(headers: &HeaderMap, ctx: &RequestContext) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(first) = header(headers::FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
    {
        return first.to_string();
    }
    if let Some(real_ip) = header(headers::REAL_IP) {
        return real_ip.to_string();
    }
    ctx.remote_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let key = client_key(request.headers(), ctx);
            match self.check(&key) {
                Decision::Limited { retry_after } => {
                    dfs_http_telemetry::metrics::record_rate_limited();
                    tracing::warn!(
                        request_id = ctx.request_id().unwrap_or("-"),
                        client = %key,
                        retry_after,
                        "rate limit exceeded"
                    );
                    let err = Error::rate_limited("rate limit exceeded")
                        .with_field("retry_after", retry_after.to_string());
                    let mut response = response::error(&err, ctx.request_id());
                    let headers = response.headers_mut();
                    headers.insert(headers::RETRY_AFTER, HeaderValue::from(retry_after));
                    headers.insert(headers::LIMIT, HeaderValue::from(self.limit));
                    headers.insert(headers::REMAINING, HeaderValue::from(0u64));
                    response
                }
                Decision::Allowed { remaining } => {
                    let mut response = next.run(ctx, request).await;
                    let headers = response.headers_mut();
                    headers.insert(headers::LIMIT, HeaderValue::from(self.limit));
                    headers.insert(headers::REMAINING, HeaderValue::from(remaining));
                    response
                }
            }
        })
    }
}
