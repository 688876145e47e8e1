//! Route handler trait.
//!
//! Handlers receive a snapshot of the [`RequestContext`] (route parameters,
//! user, transaction id already filled in) and the buffered request. They
//! return either a response or a typed [`Error`]; the error is translated
//! into a status code and error envelope at the HTTP boundary.
//!
//! Any `async` closure or function with the right signature is a handler:
//!
//! ```
//! use dfs_http_core::{response, Handler, HandlerResult, Request, RequestContext};
//!
//! async fn get_user(ctx: RequestContext, _req: Request) -> HandlerResult {
//!     let id = ctx.route_param("id").unwrap_or_default().to_string();
//!     Ok(response::json(http::StatusCode::OK, &serde_json::json!({ "user_id": id })))
//! }
//!
//! fn assert_handler<H: Handler>(_: H) {}
//! assert_handler(get_user);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;
use crate::types::{Request, Response};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produces.
pub type HandlerResult = Result<Response, Error>;

/// A type-erased, shareable handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// The core handler trait.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: RequestContext, request: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx, request))
    }
}
