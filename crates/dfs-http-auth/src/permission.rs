//! Role based permission rules.
//!
//! A rule grants or denies a set of [`Action`]s on the resources matching a
//! path pattern to holders of one role. Patterns are an exact path, a prefix
//! ending in `/*`, or `*` for everything.
//!
//! Privileged roles ([`Role::Admin`], [`Role::System`]) are always allowed.
//! For everyone else the first matching rule decides; no match means deny.

use std::fmt;
use std::str::FromStr;

use dfs_http_core::{Error, Role, UserInfo};
use http::Method;
use serde::{Deserialize, Serialize};

/// Operation performed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// `GET`, `HEAD`, `OPTIONS`.
    Read,
    /// `POST`.
    Create,
    /// `PUT`, `PATCH`.
    Update,
    /// `DELETE`.
    Delete,
}

impl Action {
    /// All actions.
    pub const ALL: [Self; 4] = [Self::Read, Self::Create, Self::Update, Self::Delete];

    /// Maps an HTTP method to the action it performs.
    ///
    /// Methods outside the standard set (`CONNECT`, `TRACE`, extensions) map
    /// to `None` and are never permitted by rules.
    #[must_use]
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Some(Self::Read),
            Method::POST => Some(Self::Create),
            Method::PUT | Method::PATCH => Some(Self::Update),
            Method::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_argument(format!("unknown action: {s}")))
    }
}

/// One permission rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Role the rule applies to.
    pub role: Role,
    /// Resource pattern: exact path, `prefix/*`, or `*`.
    pub pattern: String,
    /// Actions covered by the rule.
    pub actions: Vec<Action>,
    /// Whether matching requests are allowed or denied.
    pub allow: bool,
}

impl PermissionRule {
    /// Creates an allow rule.
    pub fn allow(role: Role, pattern: impl Into<String>, actions: &[Action]) -> Self {
        Self {
            role,
            pattern: pattern.into(),
            actions: actions.to_vec(),
            allow: true,
        }
    }

    /// Creates a deny rule.
    pub fn deny(role: Role, pattern: impl Into<String>, actions: &[Action]) -> Self {
        Self {
            allow: false,
            ..Self::allow(role, pattern, actions)
        }
    }

    /// Returns `true` if the rule's pattern covers `resource`.
    #[must_use]
    pub fn matches_resource(&self, resource: &str) -> bool {
        let pattern = self.pattern.as_str();
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix("/*") {
            Some(base) => {
                resource == base
                    || resource
                        .strip_prefix(base)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            None => resource == pattern,
        }
    }

    fn applies(&self, user: &UserInfo, resource: &str, action: Action) -> bool {
        user.has_role(self.role) && self.actions.contains(&action) && self.matches_resource(resource)
    }
}

/// Ordered list of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChecker {
    rules: Vec<PermissionRule>,
}

impl PermissionChecker {
    /// Creates a checker with no rules (everything but privileged roles is denied).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a checker from rules, in evaluation order.
    #[must_use]
    pub fn with_rules(rules: Vec<PermissionRule>) -> Self {
        Self { rules }
    }

    /// Rules for the file system API.
    ///
    /// Users manage files and their own session; guests may only read files.
    #[must_use]
    pub fn default_rules() -> Self {
        Self::with_rules(vec![
            PermissionRule::allow(Role::User, "/api/v1/files/*", &Action::ALL),
            PermissionRule::allow(Role::User, "/api/v1/auth/*", &[Action::Read, Action::Create]),
            PermissionRule::allow(Role::User, "/api/v1/cluster/*", &[Action::Read]),
            PermissionRule::allow(Role::Guest, "/api/v1/files/*", &[Action::Read]),
            PermissionRule::allow(Role::Guest, "/api/v1/auth/*", &[Action::Read, Action::Create]),
        ])
    }

    /// Appends a rule.
    pub fn push(&mut self, rule: PermissionRule) {
        self.rules.push(rule);
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Decides whether `user` may perform `action` on `resource`.
    #[must_use]
    pub fn check(&self, user: &UserInfo, resource: &str, action: Action) -> bool {
        if user.is_privileged() {
            return true;
        }
        self.rules
            .iter()
            .find(|rule| rule.applies(user, resource, action))
            .is_some_and(|rule| rule.allow)
    }

    /// Like [`check`](Self::check) but with the action derived from a method.
    #[must_use]
    pub fn check_method(&self, user: &UserInfo, resource: &str, method: &Method) -> bool {
        Action::from_method(method).is_some_and(|action| self.check(user, resource, action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> UserInfo {
        UserInfo::new("u-1", "alice").with_role(role)
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(Action::from_method(&Method::GET), Some(Action::Read));
        assert_eq!(Action::from_method(&Method::HEAD), Some(Action::Read));
        assert_eq!(Action::from_method(&Method::POST), Some(Action::Create));
        assert_eq!(Action::from_method(&Method::PATCH), Some(Action::Update));
        assert_eq!(Action::from_method(&Method::DELETE), Some(Action::Delete));
        assert_eq!(Action::from_method(&Method::TRACE), None);
        assert_eq!("Update".parse::<Action>().unwrap(), Action::Update);
        assert!("write".parse::<Action>().is_err());
    }

    #[test]
    fn test_pattern_forms() {
        let prefix = PermissionRule::allow(Role::User, "/api/files/*", &[Action::Read]);
        assert!(prefix.matches_resource("/api/files"));
        assert!(prefix.matches_resource("/api/files/a/b"));
        assert!(!prefix.matches_resource("/api/filesystem"));

        let exact = PermissionRule::allow(Role::User, "/api/files", &[Action::Read]);
        assert!(exact.matches_resource("/api/files"));
        assert!(!exact.matches_resource("/api/files/a"));

        let any = PermissionRule::allow(Role::User, "*", &[Action::Read]);
        assert!(any.matches_resource("/whatever"));
    }

    #[test]
    fn test_privileged_roles_bypass_rules() {
        let checker = PermissionChecker::new();
        assert!(checker.check(&user(Role::Admin), "/anything", Action::Delete));
        assert!(checker.check(&user(Role::System), "/anything", Action::Create));
        assert!(!checker.check(&user(Role::User), "/anything", Action::Read));
    }

    #[test]
    fn test_first_match_wins() {
        let checker = PermissionChecker::with_rules(vec![
            PermissionRule::deny(Role::User, "/api/files/secret", &Action::ALL),
            PermissionRule::allow(Role::User, "/api/files/*", &Action::ALL),
        ]);
        let alice = user(Role::User);
        assert!(!checker.check(&alice, "/api/files/secret", Action::Read));
        assert!(checker.check(&alice, "/api/files/public", Action::Read));
        assert!(!checker.check(&alice, "/api/other", Action::Read));
    }

    #[test]
    fn test_default_rules() {
        let checker = PermissionChecker::default_rules();
        let guest = user(Role::Guest);
        assert!(checker.check_method(&guest, "/api/v1/files/a.txt", &Method::GET));
        assert!(!checker.check_method(&guest, "/api/v1/files/a.txt", &Method::DELETE));

        let alice = user(Role::User);
        assert!(checker.check_method(&alice, "/api/v1/files/a.txt", &Method::DELETE));
        assert!(!checker.check_method(&alice, "/api/v1/admin/users", &Method::GET));
        assert!(!checker.check_method(&alice, "/api/v1/files/a.txt", &Method::TRACE));
    }
}
