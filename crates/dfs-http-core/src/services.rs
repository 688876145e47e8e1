//! Interfaces to external collaborators.
//!
//! Handlers and middleware reach the rest of the file system only through
//! these narrow capability traits. The metadata engine, the cluster manager
//! and persistent user storage live elsewhere; this crate only consumes them.
//!
//! Methods return [`BoxFuture`]s so that the traits stay object safe and can
//! be shared as `Arc<dyn Trait>`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::identity::{Role, UserInfo};

/// Metadata of one namespace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path in the namespace.
    pub path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Number of replicas for each chunk.
    pub replicas: u32,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// The metadata engine (file tree, chunk placement).
pub trait MetaStore: Send + Sync + 'static {
    /// Returns metadata for a path. Missing paths are `NotFound`.
    fn stat<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileInfo>>;

    /// Lists a directory. Non-directories are `InvalidArgument`.
    fn list<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<FileInfo>>>;

    /// Creates a directory. Existing paths are `AlreadyExists`.
    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileInfo>>;

    /// Removes an entry.
    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// One node of the cluster as seen by the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identifier.
    pub id: String,
    /// Advertised address.
    pub address: String,
    /// Whether the node passes health checks.
    pub healthy: bool,
}

/// The cluster manager (membership, leader election).
pub trait ClusterManager: Send + Sync + 'static {
    /// Returns the known nodes.
    fn nodes(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>>>;

    /// Returns the current leader's node id, if one is elected.
    fn leader(&self) -> BoxFuture<'_, Result<Option<String>>>;
}

/// User directory and credential checks.
pub trait UserManager: Send + Sync + 'static {
    /// Loads a user by id. Unknown ids are `NotFound`.
    fn get_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserInfo>>;

    /// Checks credentials. Wrong credentials are `Unauthenticated`.
    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<UserInfo>>;

    /// Registers a user. Taken usernames are `AlreadyExists`.
    fn create_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        roles: BTreeSet<Role>,
    ) -> BoxFuture<'a, Result<UserInfo>>;
}

/// Transaction coordinator used by the transaction middleware.
pub trait TransactionManager: Send + Sync + 'static {
    /// Starts a transaction and returns its id.
    fn begin(&self) -> BoxFuture<'_, Result<String>>;

    /// Commits a transaction.
    fn commit<'a>(&'a self, transaction_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Rolls a transaction back.
    fn rollback<'a>(&'a self, transaction_id: &'a str) -> BoxFuture<'a, Result<()>>;
}
