//! In-memory user directory.
//!
//! Passwords are stored as HMAC-SHA256 digests keyed by a per-user random
//! salt and compared in constant time.

use std::collections::{BTreeSet, HashMap};

use dfs_http_core::services::UserManager;
use dfs_http_core::{BoxFuture, Error, Result, Role, UserInfo};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Shortest accepted password.
const MIN_PASSWORD_LEN: usize = 8;

struct StoredUser {
    info: UserInfo,
    salt: [u8; 16],
    digest: Vec<u8>,
}

#[derive(Default)]
struct Directory {
    by_id: HashMap<String, StoredUser>,
    by_name: HashMap<String, String>,
}

/// Stub [`UserManager`] keeping users in memory.
#[derive(Default)]
pub struct InMemoryUserStore {
    directory: RwLock<Directory>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user synchronously (bootstrap accounts, tests).
    pub fn insert(&self, username: &str, password: &str, roles: BTreeSet<Role>) -> Result<UserInfo> {
        if username.trim().is_empty() {
            return Err(Error::invalid_argument("username must not be empty"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::invalid_argument(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let mut directory = self.directory.write();
        if directory.by_name.contains_key(username) {
            return Err(Error::already_exists(format!("user {username} already exists")));
        }

        let mut info = UserInfo::new(Uuid::new_v4().to_string(), username);
        info.roles = roles;
        let salt = *Uuid::new_v4().as_bytes();
        let digest = digest(&salt, password)?;

        directory.by_name.insert(username.to_string(), info.user_id.clone());
        directory.by_id.insert(
            info.user_id.clone(),
            StoredUser {
                info: info.clone(),
                salt,
                digest,
            },
        );
        tracing::info!(user_id = %info.user_id, username, "user registered");
        Ok(info)
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directory.read().by_id.len()
    }

    /// Returns `true` if there are no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directory.read().by_id.is_empty()
    }

    fn check(&self, username: &str, password: &str) -> Result<UserInfo> {
        let directory = self.directory.read();
        let stored = directory
            .by_name
            .get(username)
            .and_then(|id| directory.by_id.get(id))
            .ok_or_else(bad_credentials)?;

        let mut mac = HmacSha256::new_from_slice(&stored.salt)
            .map_err(|_| Error::internal("invalid password salt"))?;
        mac.update(password.as_bytes());
        mac.verify_slice(&stored.digest).map_err(|_| bad_credentials())?;
        Ok(stored.info.clone())
    }
}

impl std::fmt::Debug for InMemoryUserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryUserStore")
            .field("users", &self.len())
            .finish()
    }
}

impl UserManager for InMemoryUserStore {
    fn get_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserInfo>> {
        Box::pin(async move {
            self.directory
                .read()
                .by_id
                .get(user_id)
                .map(|stored| stored.info.clone())
                .ok_or_else(|| Error::not_found(format!("user {user_id} not found")))
        })
    }

    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<UserInfo>> {
        Box::pin(async move { self.check(username, password) })
    }

    fn create_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        roles: BTreeSet<Role>,
    ) -> BoxFuture<'a, Result<UserInfo>> {
        Box::pin(async move { self.insert(username, password, roles) })
    }
}

fn digest(salt: &[u8], password: &str) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(salt).map_err(|_| Error::internal("invalid password salt"))?;
    mac.update(password.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn bad_credentials() -> Error {
    Error::unauthenticated("invalid username or password")
}
