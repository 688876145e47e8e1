//! # DFS HTTP Client
//!
//! JSON-over-HTTP client for DFS services, built on `reqwest`.
//!
//! - [`ClientConfig`]: base URL, per-attempt timeout, default headers,
//!   bearer token, user agent
//! - [`RetryPolicy`]: bounded retries with capped exponential backoff that
//!   the caller can cancel; transport failures and `5xx` by default, or any
//!   predicate over the response or error
//! - JSON helpers that accept either a bare value or the success envelope
//!   and turn failure statuses into typed [`Error`](dfs_http_core::Error)s
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use dfs_http_client::{Client, ClientConfig, RetryPolicy};
//!
//! # async fn run() -> dfs_http_core::Result<()> {
//! let config = ClientConfig::builder("http://meta-0:8080")
//!     .timeout(Duration::from_secs(5))
//!     .retry(RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1))?)
//!     .build();
//! let client = Client::new(config)?;
//!
//! let created: serde_json::Value = client
//!     .post_json("/api/v1/files/mkdir", &serde_json::json!({ "path": "/data" }))
//!     .await?;
//! # let _ = created;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http-client/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod retry;

pub use client::{Client, ClientResponse, RequestBuilder, REQUEST_ID_HEADER};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use retry::{RetryPolicy, RetryPredicate};
