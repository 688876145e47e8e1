//! Ordered middleware chains.
//!
//! Registration order is outer-to-inner: for `[m1, m2, m3]` and handler `h`
//! the request sees `m1(m2(m3(h)))`. Pre-phases run m1 → m3, post-phases
//! m3 → m1. The chain is assembled from the back so that the first
//! registered middleware ends up outermost.

use std::sync::Arc;

use dfs_http_core::{BoxedHandler, Request, RequestContext, Response};

use crate::middleware::{Middleware, Next};

/// A shareable middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered list of middleware.
///
/// # Example
///
/// ```
/// use dfs_http_middleware::stages::{LoggingMiddleware, RecoveryMiddleware, RequestIdMiddleware};
/// use dfs_http_middleware::Chain;
///
/// let chain = Chain::new()
///     .with(RequestIdMiddleware::new())
///     .with(LoggingMiddleware::new())
///     .with(RecoveryMiddleware::new());
/// assert_eq!(chain.names(), ["request_id", "logging", "recovery"]);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<BoxedMiddleware>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware (builder style).
    #[must_use]
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(Arc::new(middleware));
        self
    }

    /// Appends a shared middleware.
    pub fn push(&mut self, middleware: BoxedMiddleware) {
        self.layers.push(middleware);
    }

    /// Appends every middleware of `other`, after the existing ones.
    pub fn extend(&mut self, other: &Self) {
        self.layers.extend(other.layers.iter().cloned());
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    /// Number of middleware.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Iterates the middleware in registration order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &dyn Middleware> + '_ {
        self.layers.iter().map(|m| m.as_ref())
    }

    /// Runs the request through the chain into `handler`.
    pub async fn run(&self, ctx: &mut RequestContext, request: Request, handler: BoxedHandler) -> Response {
        compose(self.iter(), Next::endpoint(handler))
            .run(ctx, request)
            .await
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Wraps `terminal` in `middlewares`, the first one outermost.
pub fn compose<'a, I>(middlewares: I, terminal: Next<'a>) -> Next<'a>
where
    I: IntoIterator<Item = &'a dyn Middleware>,
    I::IntoIter: DoubleEndedIterator,
{
    middlewares
        .into_iter()
        .rev()
        .fold(terminal, |next, middleware| Next::new(middleware, next))
}
