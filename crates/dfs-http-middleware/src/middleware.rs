//! Core middleware trait and the [`Next`] continuation.
//!
//! A middleware sees the mutable [`RequestContext`], the request, and a
//! [`Next`] that runs the rest of the chain. It may act before and after
//! calling `next.run(..)`, or answer on its own without calling it.
//!
//! # Example
//!
//! ```
//! use dfs_http_core::{BoxFuture, Request, RequestContext, Response};
//! use dfs_http_middleware::{Middleware, Next};
//!
//! struct ServerHeader;
//!
//! impl Middleware for ServerHeader {
//!     fn name(&self) -> &'static str {
//!         "server_header"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx, request).await;
//!             response
//!                 .headers_mut()
//!                 .insert("server", http::HeaderValue::from_static("dfs"));
//!             response
//!         })
//!     }
//! }
//! ```

use std::future::Future;

use dfs_http_core::{response, BoxFuture, BoxedHandler, Request, RequestContext, Response};

/// A request/response interceptor.
///
/// Implementations forward the context unchanged apart from their own
/// additions, keep headers set by inner layers, and never panic.
pub trait Middleware: Send + Sync + 'static {
    /// Short stable name, used in logs and [`Chain::names`](crate::Chain::names).
    fn name(&self) -> &'static str;

    /// Handles the request, usually by delegating to `next`.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

type Terminal<'a> =
    Box<dyn FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a>;

/// The remainder of the chain. Consumed by [`run`](Self::run).
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Terminal<'a>),
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// A terminal step running `f`.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut RequestContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// A terminal step calling a route handler.
    ///
    /// The handler gets a snapshot of the context. An `Err` it returns is
    /// rendered as an error envelope carrying the request id.
    #[must_use]
    pub fn endpoint(handler: BoxedHandler) -> Self {
        Self::handler(move |ctx, request| {
            let request_id = ctx.request_id().map(str::to_owned);
            let call = handler.call(ctx.clone(), request);
            Box::pin(async move {
                match call.await {
                    Ok(response) => response,
                    Err(err) => {
                        if err.http_status().is_server_error() {
                            tracing::error!(request_id = ?request_id, error = %err, "handler failed");
                        }
                        response::error(&err, request_id.as_deref())
                    }
                }
            })
        })
    }

    /// Runs the next middleware, or the terminal step.
    pub async fn run(self, ctx: &mut RequestContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            NextInner::Chain { middleware, .. } => {
                f.debug_tuple("Next::Chain").field(&middleware.name()).finish()
            }
            NextInner::Handler(_) => f.write_str("Next::Handler"),
        }
    }
}

/// A middleware defined by a closure.
///
/// # Example
///
/// ```
/// use dfs_http_middleware::FnMiddleware;
///
/// let tag = FnMiddleware::new("tag", |ctx, request, next| {
///     Box::pin(async move {
///         let mut response = next.run(ctx, request).await;
///         response
///             .headers_mut()
///             .insert("x-tag", http::HeaderValue::from_static("1"));
///         response
///     })
/// });
/// # let _ = tag;
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Request, Next<'a>) -> BoxFuture<'a, Response>
        + Send
        + Sync
        + 'static,
{
    /// Wraps `func` under `name`.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Request, Next<'a>) -> BoxFuture<'a, Response>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        (self.func)(ctx, request, next)
    }
}

impl<F> std::fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish()
    }
}

/// Boxes an `async` block into the future type handlers and middleware return.
pub fn boxed<'a, F>(fut: F) -> BoxFuture<'a, F::Output>
where
    F: Future + Send + 'a,
{
    Box::pin(fut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dfs_http_core::{Error, HandlerResult};
    use http::StatusCode;
    use http_body_util::Full;
    use std::sync::Arc;

    struct Visit(&'static str);

    impl Middleware for Visit {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                ctx.insert_route_param(self.0, "visited");
                next.run(ctx, request).await
            })
        }
    }

    fn create_test_request() -> Request {
        http::Request::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = RequestContext::new();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { response::text(StatusCode::OK, "OK") })
        });
        let response = next.run(&mut ctx, create_test_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chain_reaches_handler_with_context() {
        let first = Visit("first");
        let second = Visit("second");
        let handler: BoxedHandler = Arc::new(|ctx: RequestContext, _req: Request| async move {
            assert_eq!(ctx.route_param("first"), Some("visited"));
            assert_eq!(ctx.route_param("second"), Some("visited"));
            HandlerResult::Ok(response::no_content())
        });

        let next = Next::new(&first, Next::new(&second, Next::endpoint(handler)));
        let mut ctx = RequestContext::new();
        let response = next.run(&mut ctx, create_test_request()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_endpoint_renders_errors() {
        let handler: BoxedHandler = Arc::new(|_ctx: RequestContext, _req: Request| async {
            HandlerResult::Err(Error::not_found("no such file"))
        });
        let mut ctx = RequestContext::new();
        ctx.set_request_id("req-9");
        let response = Next::endpoint(handler).run(&mut ctx, create_test_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fn_middleware_short_circuit() {
        let gate = FnMiddleware::new("gate", |_ctx, _request, _next| {
            boxed(async { response::text(StatusCode::FORBIDDEN, "closed") })
        });
        assert_eq!(gate.name(), "gate");

        let handler: BoxedHandler = Arc::new(|_ctx: RequestContext, _req: Request| async {
            HandlerResult::Ok(response::text(StatusCode::OK, "unreachable"))
        });
        let mut ctx = RequestContext::new();
        let response = Next::new(&gate, Next::endpoint(handler))
            .run(&mut ctx, create_test_request())
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
