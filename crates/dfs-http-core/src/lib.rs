//! # DFS HTTP Core
//!
//! Core types shared by every crate of the DFS HTTP toolkit.
//!
//! This crate provides the foundational types used throughout the toolkit:
//!
//! - [`Error`] / [`ErrorCode`] - The typed error taxonomy and its HTTP mapping
//! - [`RequestContext`] - Per-request context (request id, user, transaction, route params)
//! - [`Cancellation`] - Hierarchical cancellation signal carried by the context
//! - [`UserInfo`] / [`Role`] - Resolved caller identity
//! - [`response`] - Success and error envelopes plus the response encoder
//! - [`Handler`] - The route handler trait
//! - [`services`] - Narrow interfaces to external collaborators
//!
//! ## Example
//!
//! ```
//! use dfs_http_core::{Error, ErrorCode};
//!
//! let err = Error::not_found("file /a/b does not exist").with_field("path", "/a/b");
//! assert_eq!(err.http_status().as_u16(), 404);
//! assert!(err.is_not_found());
//! assert!(err.is_code(ErrorCode::NotFound));
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancel;
mod context;
mod error;
mod handler;
mod identity;
pub mod response;
pub mod services;
mod types;

pub use cancel::{Cancellation, CancelOnDrop};
pub use context::{Extensions, RequestContext};
pub use error::{Cause, Domain, Error, ErrorCode, Result, ResultExt};
pub use handler::{BoxFuture, BoxedHandler, Handler, HandlerResult};
pub use identity::{Role, UserInfo};
pub use types::{body_bytes, json_body, Request, Response};
