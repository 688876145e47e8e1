//! # DFS HTTP Server
//!
//! Routing and serving for the DFS HTTP toolkit.
//!
//! - [`Router`]: method + pattern routes with `{param}` placeholders,
//!   prefix groups with their own middleware
//! - [`Server`]: HTTP/1.1 over TCP or TLS, read/write/idle timeouts, body
//!   size limit, graceful shutdown with a deadline
//!
//! ## Example
//!
//! ```rust,no_run
//! use dfs_http_core::{response, HandlerResult, Request, RequestContext};
//! use dfs_http_middleware::stages::{LoggingMiddleware, RecoveryMiddleware, RequestIdMiddleware};
//! use dfs_http_server::{Router, Server, ServerConfig};
//!
//! async fn get_user(ctx: RequestContext, _req: Request) -> HandlerResult {
//!     let id = ctx.route_param("id").unwrap_or_default().to_owned();
//!     Ok(response::ok(serde_json::json!({ "id": id })))
//! }
//!
//! # async fn run() -> dfs_http_core::Result<()> {
//! let mut router = Router::new();
//! router
//!     .use_middleware(RequestIdMiddleware::new())
//!     .use_middleware(LoggingMiddleware::new())
//!     .use_middleware(RecoveryMiddleware::new());
//! router.group("/api/v1").get("/users/{id}", get_user)?;
//!
//! Server::new(ServerConfig::default(), router).run().await
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod tls;

pub use config::{ServerConfig, ServerConfigBuilder, TlsFiles};
pub use router::{compile_pattern, Group, RouteMatch, Router};
pub use server::Server;
pub use shutdown::{ConnectionGuard, ConnectionTracker, ShutdownSignal};
pub use tls::{acceptor_from_pem, load_acceptor};
