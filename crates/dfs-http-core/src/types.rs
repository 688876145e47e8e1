//! HTTP request and response types shared by the toolkit.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// The HTTP request type seen by middleware and handlers.
///
/// The body is fully buffered by the server before dispatch.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by middleware and handlers.
pub type Response = http::Response<Full<Bytes>>;

/// Collects a request body into bytes.
pub async fn body_bytes(request: Request) -> Bytes {
    match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    }
}

/// Decodes a JSON request body.
///
/// An empty or malformed body is an `InvalidArgument` error.
pub async fn json_body<T: DeserializeOwned>(request: Request) -> Result<T> {
    let bytes = body_bytes(request).await;
    if bytes.is_empty() {
        return Err(Error::invalid_argument("request body is empty"));
    }
    serde_json::from_slice(&bytes).map_err(Error::from)
}
