//! Error types for the DFS HTTP toolkit.
//!
//! This module provides the [`Error`] type, the single error type carried
//! through handlers, middleware, the server and the client.
//!
//! # Error codes
//!
//! Every error carries an [`ErrorCode`] from one registered enumeration.
//! Codes are grouped by thousands:
//!
//! | Range | Meaning | HTTP |
//! |---|---|---|
//! | `1xxx` | Client errors | 4xx |
//! | `2xxx` | Server errors | 5xx |
//! | `3xxx` | Distributed-system errors | 5xx |
//!
//! The generic rule is `400` for `1xxx`, `503` for `Unavailable` and `500`
//! otherwise; individual codes override it (see [`ErrorCode::http_status`]).
//!
//! # Wrapping
//!
//! [`Error::wrap`] is idempotent: wrapping an error that is already an
//! [`Error`] returns it unchanged, while foreign errors are attached as the
//! cause of a new typed error.

use http::StatusCode;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The registered error codes.
///
/// The numeric value is the wire/JSON representation of [`Error::code`];
/// [`ErrorCode::as_str`] is the string used in response envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ErrorCode {
    /// The request is malformed or a parameter is invalid.
    InvalidArgument = 1001,
    /// The requested resource does not exist.
    NotFound = 1002,
    /// The resource being created already exists.
    AlreadyExists = 1003,
    /// The caller is authenticated but not allowed to perform the action.
    PermissionDenied = 1004,
    /// The caller is not authenticated.
    Unauthenticated = 1005,
    /// The caller exceeded its request budget.
    RateLimitExceeded = 1006,
    /// A size or quota limit was exceeded.
    ResourceExhausted = 1007,
    /// The bearer token has expired.
    ExpiredToken = 1008,
    /// The bearer token is malformed, forged or revoked.
    InvalidToken = 1009,
    /// The bearer token was signed with an unexpected algorithm.
    InvalidSigningMethod = 1010,
    /// Unexpected server-side failure.
    Internal = 2000,
    /// The service is temporarily unavailable.
    Unavailable = 2001,
    /// The operation was cancelled.
    Cancelled = 2002,
    /// The operation did not finish before its deadline.
    DeadlineExceeded = 2003,
    /// A network call to another node failed.
    NetworkError = 3001,
    /// Replicas disagree or a consistency check failed.
    ConsistencyFailed = 3002,
    /// Data could not be replicated to enough nodes.
    ReplicationFailed = 3003,
    /// The cluster is partitioned.
    PartitionError = 3004,
}

impl ErrorCode {
    /// All registered codes, in numeric order.
    pub const ALL: [Self; 18] = [
        Self::InvalidArgument,
        Self::NotFound,
        Self::AlreadyExists,
        Self::PermissionDenied,
        Self::Unauthenticated,
        Self::RateLimitExceeded,
        Self::ResourceExhausted,
        Self::ExpiredToken,
        Self::InvalidToken,
        Self::InvalidSigningMethod,
        Self::Internal,
        Self::Unavailable,
        Self::Cancelled,
        Self::DeadlineExceeded,
        Self::NetworkError,
        Self::ConsistencyFailed,
        Self::ReplicationFailed,
        Self::PartitionError,
    ];

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Looks up a registered code by its numeric value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_u16() == value)
    }

    /// Looks up a registered code by its envelope string (e.g. `NOT_FOUND`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == name)
    }

    /// Returns the machine-readable name used in response envelopes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidSigningMethod => "INVALID_SIGNING_METHOD",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ConsistencyFailed => "CONSISTENCY_FAILED",
            Self::ReplicationFailed => "REPLICATION_FAILED",
            Self::PartitionError => "PARTITION_ERROR",
        }
    }

    /// Default message used when an error is created with an empty one.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "resource not found",
            Self::AlreadyExists => "resource already exists",
            Self::PermissionDenied => "permission denied",
            Self::Unauthenticated => "authentication required",
            Self::RateLimitExceeded => "rate limit exceeded",
            Self::ResourceExhausted => "resource exhausted",
            Self::ExpiredToken => "token has expired",
            Self::InvalidToken => "invalid token",
            Self::InvalidSigningMethod => "invalid token signing method",
            Self::Internal => "internal server error",
            Self::Unavailable => "service unavailable",
            Self::Cancelled => "operation cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::NetworkError => "network error",
            Self::ConsistencyFailed => "consistency check failed",
            Self::ReplicationFailed => "replication failed",
            Self::PartitionError => "cluster partitioned",
        }
    }

    /// Returns the HTTP status code for this error code.
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Unauthenticated
            | Self::ExpiredToken
            | Self::InvalidToken
            | Self::InvalidSigningMethod => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ResourceExhausted => StatusCode::PAYLOAD_TOO_LARGE,
            other => Self::status_by_range(other.as_u16()),
        }
    }

    /// The generic range rule applied to codes without a specific mapping.
    const fn status_by_range(code: u16) -> StatusCode {
        if code / 1000 == 1 {
            StatusCode::BAD_REQUEST
        } else if code == Self::Unavailable as u16 {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Returns `true` for codes that signal a failed authentication.
    #[must_use]
    pub const fn is_authentication(self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::ExpiredToken
                | Self::InvalidToken
                | Self::InvalidSigningMethod
        )
    }

    /// Classifies a remote HTTP status into an error code.
    ///
    /// Used on the client side to turn a failed response into a typed error.
    #[must_use]
    pub fn from_http_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            413 => Self::ResourceExhausted,
            429 => Self::RateLimitExceeded,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            s if (400..500).contains(&s) => Self::InvalidArgument,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u16::deserialize(deserializer)?;
        Self::from_u16(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unregistered error code {value}")))
    }
}

/// The subsystem an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Metadata service (namespace, file tree).
    Metadata,
    /// Data servers and chunk storage.
    Storage,
    /// Transport between nodes.
    Network,
    /// Authentication and authorization.
    Security,
}

/// A foreign error attached to an [`Error`] as its cause.
///
/// Stored behind an `Arc` so that errors stay cheap to clone.
#[derive(Clone)]
pub struct Cause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl Cause {
    /// Wraps a boxed error.
    #[must_use]
    pub fn new(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self(Arc::from(err))
    }

    /// Returns the underlying error.
    #[must_use]
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Standard error type for the toolkit.
///
/// `Error` provides structured errors with:
/// - a registered [`ErrorCode`] and a non-empty message
/// - free-form metadata fields
/// - an optional cause and originating [`Domain`]
/// - HTTP status code mapping
///
/// # Example
///
/// ```
/// use dfs_http_core::{Domain, Error, ErrorCode};
///
/// fn open_chunk(id: u64) -> Result<(), Error> {
///     Err(Error::new(ErrorCode::ReplicationFailed, format!("chunk {id} has no live replica"))
///         .with_domain(Domain::Storage)
///         .with_field("chunk_id", id))
/// }
///
/// let err = open_chunk(7).unwrap_err();
/// assert_eq!(err.http_status().as_u16(), 500);
/// ```
#[derive(ThisError, Debug, Clone)]
#[error("{code}: {message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    metadata: BTreeMap<String, serde_json::Value>,
    #[source]
    cause: Option<Cause>,
    domain: Option<Domain>,
    stack: Option<String>,
}

impl Error {
    /// Creates an error with the given code and message.
    ///
    /// An empty message is replaced by the code's default description.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = code.description().to_string();
        }
        Self {
            code,
            message,
            metadata: BTreeMap::new(),
            cause: None,
            domain: None,
            stack: None,
        }
    }

    /// Wraps an existing error.
    ///
    /// If `err` already is an [`Error`] it is returned unchanged, so wrapping
    /// never stacks typed layers. Any other error becomes the cause of a new
    /// error with the given code and message.
    pub fn wrap<E>(err: E, code: ErrorCode, message: impl Into<String>) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        match err.into().downcast::<Self>() {
            Ok(typed) => *typed,
            Err(foreign) => Self::new(code, message).with_cause_boxed(foreign),
        }
    }

    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Creates an `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    /// Creates a `PermissionDenied` error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Creates an `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    /// Creates a `RateLimitExceeded` error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimitExceeded, message)
    }

    /// Creates a `ResourceExhausted` error.
    #[must_use]
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceExhausted, message)
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Creates an `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Creates a `Cancelled` error.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }

    /// Creates a `NetworkError` error in the network domain.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message).with_domain(Domain::Network)
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attaches a cause.
    #[must_use]
    pub fn with_cause<E>(self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.with_cause_boxed(Box::new(cause))
    }

    fn with_cause_boxed(mut self, cause: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        self.cause = Some(Cause::new(cause));
        self
    }

    /// Sets the originating domain.
    #[must_use]
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Attaches a captured stack trace. Never serialized into responses.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the metadata fields.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Returns the attached cause, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Returns the originating domain, if set.
    #[must_use]
    pub const fn domain(&self) -> Option<Domain> {
        self.domain
    }

    /// Returns the captured stack trace, if any.
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Returns `true` if this error has the given code.
    #[must_use]
    pub fn is_code(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Returns `true` for `NotFound` errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.is_code(ErrorCode::NotFound)
    }

    /// Returns `true` for `PermissionDenied` errors.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.is_code(ErrorCode::PermissionDenied)
    }

    /// Returns `true` for `AlreadyExists` errors.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.is_code(ErrorCode::AlreadyExists)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && self.metadata == other.metadata
            && self.domain == other.domain
            && self.cause.as_ref().map(ToString::to_string)
                == other.cause.as_ref().map(ToString::to_string)
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Error", 5)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("cause", &self.cause.as_ref().map(ToString::to_string))?;
        state.serialize_field("domain", &self.domain)?;
        state.end()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidArgument, format!("invalid JSON: {err}")).with_cause(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Internal, err.to_string()).with_cause(err)
    }
}

/// Extension trait to wrap foreign errors in results.
///
/// # Example
///
/// ```
/// use dfs_http_core::{ErrorCode, ResultExt};
///
/// let parsed: Result<u64, _> = "x".parse::<u64>().wrap_err(ErrorCode::InvalidArgument, "bad size");
/// assert_eq!(parsed.unwrap_err().code(), ErrorCode::InvalidArgument);
/// ```
pub trait ResultExt<T> {
    /// Wraps the error with [`Error::wrap`].
    fn wrap_err(self, code: ErrorCode, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    fn wrap_err(self, code: ErrorCode, message: impl Into<String>) -> Result<T> {
        self.map_err(|err| Error::wrap(err, code, message))
    }
}
