//! Cross-origin resource sharing.
//!
//! The allow-list holds exact origins and optionally `*`:
//!
//! - a request `Origin` on the list is echoed back (with `Vary: Origin`)
//! - otherwise, if `*` is listed, `Access-Control-Allow-Origin: *` is sent
//! - otherwise no allow-origin header is sent and the browser blocks the read
//!
//! Allowed methods, allowed headers and max-age are sent on every response.
//! `OPTIONS` requests are answered here with `200` and never reach the
//! handler.

use std::time::Duration;

use bytes::Bytes;
use dfs_http_core::{BoxFuture, Request, RequestContext, Response};
use http::header::{HeaderMap, HeaderValue, ORIGIN, VARY};
use http::{Method, StatusCode};
use http_body_util::Full;

use crate::middleware::{Middleware, Next};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin`.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods`.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers`.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Max-Age`.
    pub const MAX_AGE: &str = "access-control-max-age";
}

const WILDCARD: &str = "*";

/// Adds CORS headers and answers preflight requests.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origins: Vec<String>,
    methods: HeaderValue,
    headers: HeaderValue,
    max_age: HeaderValue,
}

/// Builder for [`CorsMiddleware`].
#[derive(Debug, Clone)]
pub struct CorsBuilder {
    origins: Vec<String>,
    methods: Vec<Method>,
    headers: Vec<String>,
    max_age: Duration,
}

impl Default for CorsBuilder {
    fn default() -> Self {
        Self {
            origins: vec![WILDCARD.to_string()],
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Request-ID".to_string(),
            ],
            max_age: Duration::from_secs(86_400),
        }
    }
}

impl CorsBuilder {
    /// Starts from the defaults: any origin, the common methods, and the
    /// `Content-Type`, `Authorization` and `X-Request-ID` headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the origin allow-list. Include `"*"` to allow any origin.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.origins.push(origin.into());
        self
    }

    /// Replaces the allowed methods.
    #[must_use]
    pub fn allow_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Replaces the allowed request headers.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets how long browsers may cache a preflight answer.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Builds the middleware. Header values that are not valid HTTP header
    /// text are dropped from the lists.
    #[must_use]
    pub fn build(self) -> CorsMiddleware {
        let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        let headers: Vec<&str> = self
            .headers
            .iter()
            .map(String::as_str)
            .filter(|h| HeaderValue::from_str(h).is_ok())
            .collect();
        CorsMiddleware {
            origins: self.origins,
            methods: header_list(&methods),
            headers: header_list(&headers),
            max_age: HeaderValue::from(self.max_age.as_secs()),
        }
    }
}

fn header_list(items: &[&str]) -> HeaderValue {
    HeaderValue::from_str(&items.join(", ")).unwrap_or_else(|_| HeaderValue::from_static(""))
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        CorsBuilder::new().build()
    }
}

impl CorsMiddleware {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Middleware with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The allow-origin value for a request origin, and whether it echoes it.
    fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<(HeaderValue, bool)> {
        if let Some(value) = origin {
            let listed = value
                .to_str()
                .is_ok_and(|origin| self.origins.iter().any(|o| o != WILDCARD && o == origin));
            if listed {
                return Some((value.clone(), true));
            }
        }
        self.origins
            .iter()
            .any(|o| o == WILDCARD)
            .then(|| (HeaderValue::from_static(WILDCARD), false))
    }

    fn apply(&self, target: &mut HeaderMap, origin: Option<&HeaderValue>) {
        if let Some((value, echoed)) = self.allow_origin(origin) {
            target.insert(headers::ALLOW_ORIGIN, value);
            if echoed {
                target.append(VARY, HeaderValue::from_static("Origin"));
            }
        }
        target.insert(headers::ALLOW_METHODS, self.methods.clone());
        target.insert(headers::ALLOW_HEADERS, self.headers.clone());
        target.insert(headers::MAX_AGE, self.max_age.clone());
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let origin = request.headers().get(ORIGIN).cloned();

            if request.method() == Method::OPTIONS {
                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() = StatusCode::OK;
                self.apply(response.headers_mut(), origin.as_ref());
                return response;
            }

            let mut response = next.run(ctx, request).await;
            self.apply(response.headers_mut(), origin.as_ref());
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{ok_handler, run};

    fn create_request_with_origin(method: Method, origin: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/api/v1/files");
        if let Some(origin) = origin {
            builder = builder.header(ORIGIN, origin);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    async fn call(cors: &CorsMiddleware, method: Method, origin: Option<&str>) -> Response {
        let mut ctx = RequestContext::new();
        run(cors, &mut ctx, create_request_with_origin(method, origin), ok_handler()).await
    }

    #[tokio::test]
    async fn test_listed_origin_is_echoed() {
        let cors = CorsMiddleware::builder()
            .allow_origins(["https://app.example.com", "*"])
            .build();
        let response = call(&cors, Method::GET, Some("https://app.example.com")).await;
        assert_eq!(response.headers()[headers::ALLOW_ORIGIN], "https://app.example.com");
        assert_eq!(response.headers()[VARY], "Origin");
    }

    #[tokio::test]
    async fn test_wildcard_for_unlisted_origin() {
        let cors = CorsMiddleware::builder()
            .allow_origins(["https://app.example.com", "*"])
            .build();
        let response = call(&cors, Method::GET, Some("https://other.example.com")).await;
        assert_eq!(response.headers()[headers::ALLOW_ORIGIN], "*");
        assert!(response.headers().get(VARY).is_none());

        let response = call(&cors, Method::GET, None).await;
        assert_eq!(response.headers()[headers::ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_unlisted_origin_without_wildcard_is_omitted() {
        let cors = CorsMiddleware::builder()
            .allow_origins(["https://app.example.com"])
            .build();
        let response = call(&cors, Method::GET, Some("https://evil.example.com")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(headers::ALLOW_ORIGIN).is_none());
        assert!(response.headers().contains_key(headers::ALLOW_METHODS));
    }

    #[tokio::test]
    async fn test_options_short_circuits() {
        let cors = CorsMiddleware::new();
        let response = call(&cors, Method::OPTIONS, Some("https://app.example.com")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[headers::ALLOW_METHODS],
            "GET, POST, PUT, PATCH, DELETE, OPTIONS"
        );
        assert_eq!(
            response.headers()[headers::ALLOW_HEADERS],
            "Content-Type, Authorization, X-Request-ID"
        );
        assert_eq!(response.headers()[headers::MAX_AGE], "86400");
    }

    #[tokio::test]
    async fn test_custom_lists() {
        let cors = CorsMiddleware::builder()
            .allow_methods([Method::GET])
            .allow_headers(["X-Custom"])
            .max_age(Duration::from_secs(60))
            .build();
        let response = call(&cors, Method::GET, None).await;
        assert_eq!(response.headers()[headers::ALLOW_METHODS], "GET");
        assert_eq!(response.headers()[headers::ALLOW_HEADERS], "X-Custom");
        assert_eq!(response.headers()[headers::MAX_AGE], "60");
    }

    #[test]
    fn test_middleware_name() {
        assert_eq!(CorsMiddleware::new().name(), "cors");
    }
}
