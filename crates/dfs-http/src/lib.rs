//! # DFS HTTP
//!
//! **HTTP service toolkit for the distributed file system**
//!
//! One dependency for the whole toolkit:
//!
//! - [`core`]: typed errors mapped to HTTP status codes, the request
//!   context, response envelopes, collaborator traits
//! - [`auth`]: HMAC-signed tokens, permission rules, auth endpoints
//! - [`middleware`]: the middleware chain and its standard stages
//! - [`server`]: router with `{param}` patterns and groups, HTTP/1.1 server
//! - [`client`]: JSON client with bounded, cancellable retries
//! - [`telemetry`]: logging setup and metrics collection
//! - [`config`]: typed configuration with environment overrides
//! - [`routes`]: ready-made health, metrics, auth, file and cluster endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dfs_http::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConfigLoader::new().with_env_prefix("DFS").load()?;
//!     let _ = init_logging(&config.log_config());
//!
//!     let collector = Arc::new(InMemoryCollector::new());
//!     let mut router = Router::new();
//!     router
//!         .use_middleware(RequestIdMiddleware::new())
//!         .use_middleware(LoggingMiddleware::new())
//!         .use_middleware(RecoveryMiddleware::new())
//!         .use_middleware(MetricsMiddleware::new(collector.clone()));
//!     if let Some(limiter) = config.rate_limiter() {
//!         router.use_middleware(limiter);
//!     }
//!     dfs_http::routes::health(&mut router)?;
//!     dfs_http::routes::metrics(&mut router, collector)?;
//!
//!     Server::new(config.server_config(), router).run().await
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! Request → RequestId → Logging → Recovery → CORS → RateLimit → Metrics → Auth → Transaction → Handler
//!                                                                                                 ↓
//! Response ←──────────────────────────────── (same stages, reversed) ←───────────────────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use dfs_http_auth as auth;
pub use dfs_http_client as client;
pub use dfs_http_config as config;
pub use dfs_http_core as core;
pub use dfs_http_middleware as middleware;
pub use dfs_http_server as server;
pub use dfs_http_telemetry as telemetry;

pub mod routes;

/// Prelude module for convenient imports.
///
/// ```
/// use dfs_http::prelude::*;
///
/// let err = Error::not_found("no such file");
/// assert_eq!(err.http_status().as_u16(), 404);
/// ```
pub mod prelude {
    pub use dfs_http_core::services::{ClusterManager, MetaStore, TransactionManager, UserManager};
    pub use dfs_http_core::{
        response, Cancellation, Domain, Error, ErrorCode, Handler, HandlerResult, Request, RequestContext,
        Response, Result, Role, UserInfo,
    };

    pub use dfs_http_auth::{AuthService, InMemoryUserStore, PermissionChecker, TokenMaker};

    pub use dfs_http_middleware::stages::{
        AuthMiddleware, CorsMiddleware, LoggingMiddleware, MetricsMiddleware, RateLimitMiddleware,
        RecoveryMiddleware, RequestIdMiddleware, TimeoutMiddleware, TransactionMiddleware,
    };
    pub use dfs_http_middleware::{Chain, Middleware, Next};

    pub use dfs_http_server::{Router, Server, ServerConfig};

    pub use dfs_http_client::{Client, ClientConfig, RetryPolicy};

    pub use dfs_http_telemetry::{init_logging, InMemoryCollector, LogConfig, MetricsCollector};

    pub use dfs_http_config::{ConfigLoader, DfsHttpConfig};
}
