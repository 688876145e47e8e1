//! Caller identity.
//!
//! A [`UserInfo`] is resolved by the auth middleware (from a verified token)
//! or by the login handler (from credentials) and placed in the
//! [`RequestContext`](crate::RequestContext) for handlers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access to every resource.
    Admin,
    /// Regular user, subject to permission rules.
    User,
    /// Read-mostly access, subject to permission rules.
    Guest,
    /// Internal service identity with full access.
    System,
}

impl Role {
    /// Returns the lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Guest => "guest",
            Self::System => "system",
        }
    }

    /// Returns `true` for roles that bypass permission rules.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Admin | Self::System)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "guest" => Ok(Self::Guest),
            "system" => Ok(Self::System),
            other => Err(Error::invalid_argument(format!("unknown role '{other}'"))),
        }
    }
}

/// The authenticated caller of a request.
///
/// # Example
///
/// ```
/// use dfs_http_core::{Role, UserInfo};
///
/// let user = UserInfo::new("u-1", "alice").with_role(Role::User);
/// assert!(user.has_role(Role::User));
/// assert!(!user.is_privileged());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable user identifier (token subject).
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Granted roles.
    #[serde(default)]
    pub roles: BTreeSet<Role>,
    /// Free-form attributes.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserInfo {
    /// Creates a user without roles.
    #[must_use]
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            roles: BTreeSet::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    /// Adds an extra attribute.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the user has the role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns `true` if any granted role bypasses permission rules.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.roles.iter().any(|role| role.is_privileged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" system ".parse::<Role>().unwrap(), Role::System);
        assert!("root".parse::<Role>().unwrap_err().is_code(crate::ErrorCode::InvalidArgument));
    }

    #[test]
    fn test_privileged_roles() {
        assert!(UserInfo::new("1", "a").with_role(Role::Admin).is_privileged());
        assert!(UserInfo::new("2", "b").with_role(Role::System).is_privileged());
        assert!(!UserInfo::new("3", "c").with_role(Role::Guest).is_privileged());
    }

    #[test]
    fn test_serde_roundtrip_uses_lowercase() {
        let user = UserInfo::new("u-9", "bob")
            .with_role(Role::User)
            .with_extra("quota_gb", 10);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["roles"][0], "user");

        let back: UserInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }
}
