//! Response encoder and standard envelopes.
//!
//! Every JSON API response uses one of two envelopes:
//!
//! ```text
//! {"success": true,  "data": <payload>}
//! {"success": false, "error": {"code": "NOT_FOUND", "message": "...", "request_id": "..."}}
//! ```
//!
//! [`error`] is the only place where a typed [`Error`] becomes a status code
//! and an error envelope.
//!
//! | Function | Content-Type | Description |
//! |---|---|---|
//! | [`success`] / [`ok`] / [`created`] | `application/json` | Success envelope |
//! | [`json`] | `application/json` | Raw JSON body, no envelope |
//! | [`error`] | `application/json` | Error envelope with mapped status |
//! | [`text`] | `text/plain` | Plain text |
//! | [`no_content`] | none | 204 No Content |

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::StatusCode;
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode};
use crate::types::Response;

/// `Content-Type` for JSON bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Success envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope<T> {
    /// Always `true`.
    pub success: bool,
    /// The payload.
    pub data: T,
}

/// Body of the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `NOT_FOUND`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlating with server logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Always `false`.
    pub success: bool,
    /// The error details.
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    /// Builds the envelope for an error. The stack trace is never included.
    #[must_use]
    pub fn from_error(err: &Error, request_id: Option<&str>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: err.code().as_str().to_string(),
                message: err.message().to_string(),
                request_id: request_id.map(ToString::to_string),
            },
        }
    }
}

/// Either envelope, as decoded by clients.
///
/// # Example
///
/// ```
/// use dfs_http_core::response::ApiResponse;
///
/// let ok: ApiResponse<u32> = serde_json::from_str(r#"{"success":true,"data":7}"#).unwrap();
/// assert_eq!(ok.into_result().unwrap(), 7);
///
/// let err: ApiResponse<u32> = serde_json::from_str(
///     r#"{"success":false,"error":{"code":"NOT_FOUND","message":"gone"}}"#,
/// ).unwrap();
/// assert!(err.into_result().unwrap_err().is_not_found());
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Payload on success. `null` and an absent field both read as `None`.
    pub data: Option<T>,
    /// Error details on failure.
    pub error: Option<ErrorBody>,
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Converts the envelope into a result.
    ///
    /// A success envelope without data decodes JSON `null` as `T`, so `()`
    /// and `Option<_>` payloads round-trip. A failure envelope becomes a
    /// typed error whose code is recovered from the envelope's code string
    /// (unknown strings map to `Internal`).
    pub fn into_result(self) -> Result<T, Error> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (true, None, _) => T::deserialize(serde_json::Value::Null).map_err(|e| {
                Error::wrap(e, ErrorCode::Internal, "success envelope without data")
            }),
            (false, _, Some(body)) => {
                let code = ErrorCode::from_name(&body.code).unwrap_or(ErrorCode::Internal);
                let mut err = Error::new(code, body.message);
                if let Some(request_id) = body.request_id {
                    err = err.with_field("request_id", request_id);
                }
                Err(err)
            }
            (false, _, None) => Err(Error::internal("error envelope without details")),
        }
    }
}

fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Writes `value` as a raw JSON body.
///
/// A value that fails to serialize yields a 500 error envelope.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, APPLICATION_JSON, body),
        Err(err) => error(
            &Error::internal("failed to encode response").with_cause(err),
            None,
        ),
    }
}

/// Writes `data` inside a success envelope.
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    json(status, &SuccessEnvelope { success: true, data })
}

/// `200 OK` success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    success(StatusCode::OK, data)
}

/// `201 Created` success envelope.
pub fn created<T: Serialize>(data: T) -> Response {
    success(StatusCode::CREATED, data)
}

/// Writes an error envelope with the error's mapped status.
///
/// Authentication failures also carry `WWW-Authenticate: Bearer`.
pub fn error(err: &Error, request_id: Option<&str>) -> Response {
    let envelope = ErrorEnvelope::from_error(err, request_id);
    // Serializing a struct of strings cannot fail.
    let body = serde_json::to_vec(&envelope).unwrap_or_default();
    let mut response = with_body(err.http_status(), APPLICATION_JSON, body);
    if err.code().is_authentication() {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

/// Writes a plain-text body.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    with_body(status, "text/plain; charset=utf-8", body.into())
}

/// `204 No Content`.
pub fn no_content() -> Response {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}
