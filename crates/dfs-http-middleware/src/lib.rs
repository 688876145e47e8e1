//! # DFS HTTP Middleware
//!
//! Composable request/response interceptors for the DFS HTTP toolkit.
//!
//! A [`Middleware`] receives the mutable [`RequestContext`](dfs_http_core::RequestContext),
//! the request, and a [`Next`] continuation. A [`Chain`] holds middleware in
//! registration order; the first registered is the outermost:
//!
//! ```text
//! Request → m1 → m2 → m3 → handler
//!                            ↓
//! Response ← m1 ← m2 ← m3 ←──┘
//! ```
//!
//! ## Example
//!
//! ```
//! use dfs_http_middleware::stages::{LoggingMiddleware, RecoveryMiddleware, RequestIdMiddleware};
//! use dfs_http_middleware::Chain;
//!
//! let chain = Chain::new()
//!     .with(RequestIdMiddleware::new())
//!     .with(LoggingMiddleware::new())
//!     .with(RecoveryMiddleware::new());
//! assert_eq!(chain.names(), ["request_id", "logging", "recovery"]);
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod middleware;
pub mod stages;

pub use chain::{compose, BoxedMiddleware, Chain};
pub use middleware::{boxed, FnMiddleware, Middleware, Next};
