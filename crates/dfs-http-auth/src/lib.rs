//! # DFS HTTP Auth
//!
//! Authentication building blocks for the DFS HTTP toolkit.
//!
//! - [`TokenMaker`] - Issues and verifies compact HMAC-signed bearer tokens
//! - [`extract_token`] - Finds a token in a request (header, cookie, query)
//! - [`RevocationList`] - Tokens revoked before their expiry (logout, refresh)
//! - [`PermissionChecker`] - Role/path/action permission rules
//! - [`InMemoryUserStore`] - Stub [`UserManager`](dfs_http_core::services::UserManager)
//! - [`AuthService`] - Login, register, refresh, logout and `me` handlers
//!
//! ## Example
//!
//! ```
//! use chrono::Duration;
//! use dfs_http_auth::TokenMaker;
//!
//! let maker = TokenMaker::new(b"0123456789abcdef0123456789abcdef".to_vec()).unwrap();
//! let (token, issued) = maker.create("alice", "u-1", Duration::minutes(15)).unwrap();
//! let verified = maker.verify(&token).unwrap();
//! assert_eq!(verified.username, "alice");
//! assert_eq!(verified.id, issued.id);
//! ```

#![doc(html_root_url = "https://docs.rs/dfs-http-auth/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod extract;
mod permission;
mod revocation;
mod service;
mod token;
mod users;

pub use extract::{extract_token, AUTH_COOKIE, TOKEN_QUERY_PARAM};
pub use permission::{Action, PermissionChecker, PermissionRule};
pub use revocation::RevocationList;
pub use service::{AuthService, Credentials, TokenResponse};
pub use token::{Algorithm, TokenMaker, TokenPayload, MIN_SECRET_LEN};
pub use users::InMemoryUserStore;
