//! The HTTP client.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dfs_http_core::response::{ApiResponse, APPLICATION_JSON};
use dfs_http_core::{Cancellation, Domain, Error, ErrorCode, RequestContext, Result};
use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::retry::RetryPolicy;

/// Header carrying the request id across services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest slice of a non-envelope error body copied into an error message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for DFS services.
///
/// Cloning is cheap; clones share the connection pool.
///
/// # Example
///
/// ```rust,no_run
/// use dfs_http_client::{Client, ClientConfig};
///
/// # async fn run() -> dfs_http_core::Result<()> {
/// let client = Client::new(ClientConfig::builder("http://127.0.0.1:8080").build())?;
/// let status: serde_json::Value = client.get_json("/api/status").await?;
/// # let _ = status;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the base URL, a default header or the bearer
    /// token is unusable.
    pub fn new(config: ClientConfig) -> Result<Self> {
        reqwest::Url::parse(config.base_url()).map_err(|e| {
            Error::wrap(e, ErrorCode::InvalidArgument, format!("invalid base URL {:?}", config.base_url()))
        })?;

        let mut headers = config.default_headers().clone();
        let user_agent = HeaderValue::from_str(config.user_agent())
            .map_err(|e| Error::wrap(e, ErrorCode::InvalidArgument, "invalid user agent"))?;
        headers.insert(USER_AGENT, user_agent);
        if let Some(token) = config.bearer_token() {
            headers.insert(AUTHORIZATION, bearer(token)?);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::wrap(e, ErrorCode::Internal, "failed to build HTTP client"))?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts a request. `path` is resolved against the base URL unless it
    /// is an absolute URL.
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            method,
            path: path.to_owned(),
            headers: HeaderMap::new(),
            body: None,
            cancellation: None,
            timeout: None,
            retry: self.config.retry().clone(),
            error: None,
        }
    }

    /// Starts a `GET`.
    #[must_use]
    pub fn get(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    /// Starts a `POST`.
    #[must_use]
    pub fn post(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    /// Starts a `PUT`.
    #[must_use]
    pub fn put(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    /// Starts a `DELETE`.
    #[must_use]
    pub fn delete(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    /// `GET`s `path` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::send`]; decode failures are `Internal`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).send_json().await
    }

    /// Like [`get_json`](Self::get_json) with extra headers for this call.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn get_json_with_headers<T: DeserializeOwned>(&self, path: &str, headers: HeaderMap) -> Result<T> {
        self.get(path).headers(headers).send_json().await
    }

    /// `POST`s `body` as JSON and decodes the JSON reply.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json); serialization failures are `InvalidArgument`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(path).json(body).send_json().await
    }

    /// `PUT`s `body` as JSON and decodes the JSON reply.
    ///
    /// # Errors
    ///
    /// See [`post_json`](Self::post_json).
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.put(path).json(body).send_json().await
    }

    /// `DELETE`s `path` and decodes the JSON reply. An empty reply decodes
    /// as JSON `null`, so `()` and `Option<_>` work for bodiless endpoints.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.delete(path).send_json().await
    }

    fn resolve(&self, path: &str) -> Result<reqwest::Url> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else {
            let base = self.config.base_url().trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        };
        reqwest::Url::parse(&url)
            .map_err(|e| Error::wrap(e, ErrorCode::InvalidArgument, format!("invalid request URL {url:?}")))
    }
}

/// A request under construction.
#[derive(Debug)]
#[must_use = "requests do nothing until sent"]
pub struct RequestBuilder<'c> {
    client: &'c Client,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    cancellation: Option<Cancellation>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    error: Option<Error>,
}

impl RequestBuilder<'_> {
    /// Adds a header, replacing any default of the same name.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds several headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sends `token` as a bearer token for this call.
    pub fn bearer_token(mut self, token: &str) -> Self {
        match bearer(token) {
            Ok(value) => {
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Serializes `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                self.body = Some(Bytes::from(bytes));
            }
            Err(e) => {
                self.error = Some(Error::wrap(e, ErrorCode::InvalidArgument, "failed to encode request body"));
            }
        }
        self
    }

    /// Sets a raw request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Aborts the request, including any backoff sleep, when `cancellation` fires.
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Overrides the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the retry policy for this call.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ties the call to an inbound request: its cancellation signal, its
    /// request id (propagated as `X-Request-ID`) and its remaining deadline.
    pub fn context(mut self, ctx: &RequestContext) -> Self {
        self.cancellation = Some(ctx.cancellation().clone());
        if let Some(value) = ctx.request_id().and_then(|id| HeaderValue::from_str(id).ok()) {
            self.headers
                .entry(HeaderName::from_static(REQUEST_ID_HEADER))
                .or_insert(value);
        }
        if let Some(remaining) = ctx.remaining() {
            self.timeout = Some(self.timeout.map_or(remaining, |timeout| timeout.min(remaining)));
        }
        self
    }

    /// Sends the request, retrying per the policy, and reads the whole body.
    ///
    /// # Errors
    ///
    /// - `Cancelled` when the cancellation signal fires
    /// - `NetworkError` when the last attempt failed in transport
    /// - a code classified from the status when the last response is `>= 400`,
    ///   carrying the server's envelope message when there is one
    pub async fn send(self) -> Result<ClientResponse> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let url = self.client.resolve(&self.path)?;
        let mut builder = self
            .client
            .http
            .request(self.method.clone(), url.clone())
            .headers(self.headers);
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let request = builder
            .build()
            .map_err(|e| Error::wrap(e, ErrorCode::InvalidArgument, "failed to build request"))?;

        let cancellation = self.cancellation.unwrap_or_default();
        let client = &self.client.http;
        let max_retries = self.retry.max_retries();
        let mut template = Some(request);
        let mut attempt = 0;

        let outcome = loop {
            let Some(current) = template.take() else {
                break Err(Error::internal("request consumed without an outcome"));
            };
            // Unclonable bodies get exactly one attempt.
            template = current.try_clone();
            if template.is_none() && max_retries > 0 {
                tracing::debug!(%url, "request body cannot be replayed, retries disabled");
            }

            tracing::debug!(method = %self.method, %url, attempt, "sending request");
            let outcome = cancellation.run(execute(client, current)).await?;

            let retryable = self.retry.should_retry(&outcome);
            if !retryable || attempt >= max_retries || template.is_none() {
                break outcome;
            }

            attempt += 1;
            let delay = self.retry.backoff(attempt);
            match &outcome {
                Ok(response) => tracing::warn!(
                    method = %self.method, %url, attempt,
                    status = response.status().as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                ),
                Err(e) => tracing::warn!(
                    method = %self.method, %url, attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                ),
            }
            cancellation
                .run(tokio::time::sleep(delay))
                .await
                .map_err(|_| Error::cancelled("request cancelled during retry backoff").with_field("attempt", attempt))?;
        };

        let response = outcome?;
        if response.status().as_u16() >= 400 {
            return Err(status_error(&self.method, &url, &response));
        }
        Ok(response)
    }

    /// Sends the request and decodes the JSON body as `T`, accepting either
    /// a bare value or the `{"success":true,"data":…}` envelope.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send); decode failures are `Internal`.
    pub async fn send_json<T: DeserializeOwned>(self) -> Result<T> {
        self.send().await?.json()
    }
}

/// Sends one attempt and drains the body.
async fn execute(client: &reqwest::Client, request: reqwest::Request) -> Result<ClientResponse> {
    let url = request.url().clone();
    let response = client.execute(request).await.map_err(|e| transport_error(&url, e))?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(|e| transport_error(&url, e))?;
    Ok(ClientResponse { status, headers, body })
}

fn transport_error(url: &reqwest::Url, err: reqwest::Error) -> Error {
    let message = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "failed to read response body"
    } else {
        "request failed"
    };
    Error::network(message)
        .with_domain(Domain::Network)
        .with_field("url", url.as_str())
        .with_cause(err)
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::wrap(e, ErrorCode::InvalidArgument, "invalid bearer token"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Converts a `>= 400` response into a typed error.
fn status_error(method: &Method, url: &reqwest::Url, response: &ClientResponse) -> Error {
    let status = response.status();
    let mut code = ErrorCode::from_http_status(status);
    let mut request_id = None;

    let message = match serde_json::from_slice::<ApiResponse<serde_json::Value>>(response.body()) {
        Ok(ApiResponse {
            error: Some(body), ..
        }) => {
            // Keep the server's finer code when it agrees with the status.
            if let Some(remote) = ErrorCode::from_name(&body.code).filter(|c| c.http_status() == status) {
                code = remote;
            }
            request_id = body.request_id;
            body.message
        }
        _ => {
            let text = String::from_utf8_lossy(response.body());
            let text = text.trim();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                truncate(text, MAX_ERROR_BODY)
            }
        }
    };

    let mut err = Error::new(code, message)
        .with_domain(Domain::Network)
        .with_field("status", status.as_u16())
        .with_field("method", method.as_str())
        .with_field("url", url.as_str());
    if let Some(request_id) = request_id {
        err = err.with_field("request_id", request_id);
    }
    err
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ClientResponse {
    #[cfg(test)]
    pub(crate) fn from_parts(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// The `X-Request-ID` the server answered with.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(REQUEST_ID_HEADER)?.to_str().ok()
    }

    /// Body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as `T`, unwrapping the success envelope when present.
    ///
    /// # Errors
    ///
    /// `Internal` when the body is not valid JSON for `T`; the envelope's
    /// error when it is a failure envelope.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.body)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let value: serde_json::Value = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(body).map_err(decode_error)?
    };

    if is_envelope(&value) {
        let envelope: ApiResponse<T> = serde_json::from_value(value).map_err(decode_error)?;
        return envelope.into_result();
    }
    serde_json::from_value(value).map_err(decode_error)
}

fn is_envelope(value: &serde_json::Value) -> bool {
    value.as_object().is_some_and(|object| {
        object.get("success").is_some_and(serde_json::Value::is_boolean)
            && (object.contains_key("data") || object.contains_key("error"))
    })
}

fn decode_error(err: serde_json::Error) -> Error {
    Error::wrap(err, ErrorCode::Internal, "failed to decode response body")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Status {
        status: String,
    }

    fn client(base: &str) -> Client {
        Client::new(ClientConfig::builder(base).build()).unwrap()
    }

    fn response(status: u16, body: &'static str) -> ClientResponse {
        ClientResponse::from_parts(StatusCode::from_u16(status).unwrap(), body)
    }

    #[test]
    fn test_resolve_joins_base_and_path() {
        let client = client("http://127.0.0.1:8080/");
        assert_eq!(client.resolve("/api/status").unwrap().as_str(), "http://127.0.0.1:8080/api/status");
        assert_eq!(client.resolve("api/status").unwrap().as_str(), "http://127.0.0.1:8080/api/status");

        let nested = client_with_prefix();
        assert_eq!(nested.resolve("/files/a").unwrap().as_str(), "http://meta:9000/api/v1/files/a");
        assert_eq!(nested.resolve("https://other/x").unwrap().as_str(), "https://other/x");
    }

    fn client_with_prefix() -> Client {
        client("http://meta:9000/api/v1")
    }

    #[test]
    fn test_invalid_configuration() {
        let err = Client::new(ClientConfig::builder("not a url").build()).unwrap_err();
        assert!(err.is_code(ErrorCode::InvalidArgument));

        let err = Client::new(ClientConfig::builder("http://x").bearer_token("bad\ntoken").build()).unwrap_err();
        assert!(err.is_code(ErrorCode::InvalidArgument));
    }

    #[test]
    fn test_decode_bare_and_enveloped() {
        let bare: Status = decode(br#"{"status":"ok"}"#).unwrap();
        let wrapped: Status = decode(br#"{"success":true,"data":{"status":"ok"}}"#).unwrap();
        assert_eq!(bare, wrapped);

        let err = decode::<Status>(br#"{"success":false,"error":{"code":"NOT_FOUND","message":"gone"}}"#).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), "gone");
    }

    #[test]
    fn test_decode_empty_body_as_null() {
        decode::<()>(b"").unwrap();
        decode::<()>(br#"{"success":true,"data":null}"#).unwrap();
        assert_eq!(decode::<Option<Status>>(br#"{"success":true,"data":null}"#).unwrap(), None);
        assert_eq!(decode::<Option<Status>>(b"  ").unwrap(), None);
        assert!(decode::<Status>(b"").unwrap_err().is_code(ErrorCode::Internal));
    }

    #[test]
    fn test_decode_garbage_is_internal() {
        let err = decode::<Status>(b"<html>").unwrap_err();
        assert!(err.is_code(ErrorCode::Internal));
    }

    #[test]
    fn test_status_error_uses_envelope() {
        let url = reqwest::Url::parse("http://x/api").unwrap();
        let body = r#"{"success":false,"error":{"code":"EXPIRED_TOKEN","message":"token has expired","request_id":"r-1"}}"#;
        let err = status_error(&Method::GET, &url, &response(401, body));
        assert!(err.is_code(ErrorCode::ExpiredToken));
        assert_eq!(err.message(), "token has expired");
        assert_eq!(err.metadata()["request_id"], "r-1");
        assert_eq!(err.metadata()["status"], 401);
    }

    #[test]
    fn test_status_error_ignores_code_that_disagrees_with_status() {
        let url = reqwest::Url::parse("http://x/api").unwrap();
        let body = r#"{"success":false,"error":{"code":"NOT_FOUND","message":"odd"}}"#;
        let err = status_error(&Method::GET, &url, &response(503, body));
        assert!(err.is_code(ErrorCode::Unavailable));
        assert_eq!(err.message(), "odd");
    }

    #[test]
    fn test_status_error_falls_back_to_body_text() {
        let url = reqwest::Url::parse("http://x/api").unwrap();
        let err = status_error(&Method::POST, &url, &response(502, "upstream exploded"));
        assert!(err.is_code(ErrorCode::Internal));
        assert_eq!(err.message(), "upstream exploded");

        let err = status_error(&Method::POST, &url, &response(404, ""));
        assert!(err.is_not_found());
        assert_eq!(err.message(), "Not Found");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é…");
    }

    #[test]
    fn test_context_propagates_request_id_and_deadline() {
        let client = client("http://x");
        let mut ctx = RequestContext::new();
        ctx.set_request_id("req-42");
        ctx.set_deadline(std::time::Instant::now() + Duration::from_secs(1));

        let builder = client.get("/a").timeout(Duration::from_secs(10)).context(&ctx);
        assert_eq!(builder.headers[REQUEST_ID_HEADER], "req-42");
        assert!(builder.timeout.unwrap() <= Duration::from_secs(1));
        assert!(builder.cancellation.is_some());
    }
}
