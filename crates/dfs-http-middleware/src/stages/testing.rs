//! Shared fixtures for stage tests.

use std::sync::Arc;

use bytes::Bytes;
use dfs_http_core::{response, BoxedHandler, HandlerResult, Request, RequestContext, Response};
use http::StatusCode;
use http_body_util::{BodyExt, Full};

use crate::middleware::{Middleware, Next};

pub(crate) fn create_test_request() -> Request {
    request(http::Method::GET, "/test")
}

pub(crate) fn request(method: http::Method, uri: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub(crate) fn status_handler(status: StatusCode) -> BoxedHandler {
    Arc::new(move |_ctx: RequestContext, _req: Request| async move {
        HandlerResult::Ok(response::text(status, "handled"))
    })
}

pub(crate) fn ok_handler() -> BoxedHandler {
    status_handler(StatusCode::OK)
}

pub(crate) async fn run(
    middleware: &dyn Middleware,
    ctx: &mut RequestContext,
    request: Request,
    handler: BoxedHandler,
) -> Response {
    middleware.process(ctx, request, Next::endpoint(handler)).await
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
