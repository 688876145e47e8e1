//! Typed configuration for the DFS HTTP toolkit.
//!
//! [`DfsHttpConfig`] groups the sections a DFS service needs:
//!
//! - [`ServerSection`]: bind address, timeouts, body limit, TLS files
//! - [`AuthSection`]: token secret, token lifetime, issuer, public paths
//! - [`ClientSection`]: base URL, timeout, retry policy
//! - [`RateLimitSection`]: per-client limit and window
//! - [`LoggingSection`]: level and output format
//!
//! All sections implement `serde::Deserialize` with defaults and strict
//! field checking, so any serde format can feed them. [`ConfigLoader`]
//! layers `PREFIX__SECTION__KEY` environment variables on top and validates
//! the result; conversion methods produce the runtime types.
//!
//! # Example
//!
//! ```
//! use dfs_http_config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_production()
//!     .with_vars([
//!         ("DFS__AUTH__TOKEN_SECRET", "0123456789abcdef0123456789abcdef"),
//!         ("DFS__RATE_LIMIT__LIMIT", "20"),
//!     ])
//!     .with_env_prefix("DFS")
//!     .load()
//!     .unwrap();
//!
//! let tokens = config.token_maker().unwrap();
//! let server = config.server_config();
//! # let _ = (tokens, server);
//! ```
//!
//! # Environment variables
//!
//! | Variable | Field |
//! |---|---|
//! | `DFS__SERVER__BIND_ADDR` | `server.bind_addr` |
//! | `DFS__SERVER__READ_TIMEOUT_SECS` | `server.read_timeout_secs` |
//! | `DFS__SERVER__TLS__CERT` | `server.tls.cert` |
//! | `DFS__AUTH__TOKEN_SECRET` | `auth.token_secret` |
//! | `DFS__AUTH__PUBLIC_PATHS` | `auth.public_paths` (comma separated) |
//! | `DFS__CLIENT__RETRY__MAX_RETRIES` | `client.retry.max_retries` |
//! | `DFS__RATE_LIMIT__WINDOW_SECS` | `rate_limit.window_secs` |
//! | `DFS__LOGGING__FORMAT` | `logging.format` (`json` or `pretty`) |

#![doc(html_root_url = "https://docs.rs/dfs-http-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{DfsHttpConfig, MIN_TOKEN_SECRET_LEN};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    AuthSection, ClientSection, LogFormat, LoggingSection, RateLimitSection, RetrySection, ServerSection,
    TlsSection,
};
