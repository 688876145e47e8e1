//! Request ID propagation.
//!
//! A non-empty incoming `X-Request-ID` is kept verbatim so that ids assigned
//! by a proxy or an upstream service survive the hop. Otherwise a random
//! UUID v4 is generated. The id is stored in the context, copied onto the
//! request headers for handlers, and echoed on the response.

use dfs_http_core::{BoxFuture, Request, RequestContext, Response};
use http::HeaderValue;
use uuid::Uuid;

use crate::middleware::{Middleware, Next};

/// The header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assigns every request an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdMiddleware {
    _private: (),
}

impl RequestIdMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    fn incoming(request: &Request) -> Option<(String, HeaderValue)> {
        let value = request.headers().get(REQUEST_ID_HEADER)?;
        let id = value.to_str().ok()?.trim();
        (!id.is_empty()).then(|| (id.to_string(), value.clone()))
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let (id, header) = match Self::incoming(&request) {
                Some(found) => found,
                None => {
                    let id = Uuid::new_v4().to_string();
                    match HeaderValue::from_str(&id) {
                        Ok(header) => (id, header),
                        Err(_) => return next.run(ctx, request).await,
                    }
                }
            };

            ctx.set_request_id(id);
            request.headers_mut().insert(REQUEST_ID_HEADER, header.clone());

            let mut response = next.run(ctx, request).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, header);
            response
        })
    }
}
