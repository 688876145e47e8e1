//! Per-request context.
//!
//! A [`RequestContext`] is created by the server for every request and
//! threaded through the middleware chain to the handler. Middleware enrich
//! it (request id, user, transaction id, deadline); the router fills in the
//! route parameters just before the handler runs.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::Cancellation;
use crate::identity::UserInfo;

/// Type-keyed storage for values that middleware share with handlers.
///
/// Values are stored behind an `Arc`, so cloning the map is cheap and keeps
/// every entry.
#[derive(Clone, Default)]
pub struct Extensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Stores a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Returns the stored value of type `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Removes the value of type `T`, returning whether one was present.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.map.remove(&TypeId::of::<T>()).is_some()
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions").field("len", &self.map.len()).finish()
    }
}

/// Context for a single request.
///
/// # Example
///
/// ```
/// use dfs_http_core::{RequestContext, Role, UserInfo};
///
/// let mut ctx = RequestContext::new();
/// ctx.set_request_id("req-1");
/// ctx.set_user(UserInfo::new("u-1", "alice").with_role(Role::User));
/// ctx.insert_route_param("id", "42");
///
/// assert_eq!(ctx.request_id(), Some("req-1"));
/// assert_eq!(ctx.route_param("id"), Some("42"));
/// assert_eq!(ctx.user().map(|u| u.username.as_str()), Some("alice"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Option<String>,
    deadline: Option<Instant>,
    user: Option<UserInfo>,
    transaction_id: Option<String>,
    route_params: HashMap<String, String>,
    cancellation: Cancellation,
    remote_addr: Option<SocketAddr>,
    started_at: Instant,
    extensions: Extensions,
}

impl RequestContext {
    /// Creates a context with its own root cancellation signal.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(Cancellation::new())
    }

    /// Creates a context bound to the given cancellation signal.
    ///
    /// The server passes a child of its shutdown signal here.
    #[must_use]
    pub fn with_cancellation(cancellation: Cancellation) -> Self {
        Self {
            request_id: None,
            deadline: None,
            user: None,
            transaction_id: None,
            route_params: HashMap::new(),
            cancellation,
            remote_addr: None,
            started_at: Instant::now(),
            extensions: Extensions::default(),
        }
    }

    /// Sets the remote peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Returns the request ID, set by the request-id middleware.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Sets the request ID.
    pub fn set_request_id(&mut self, request_id: impl Into<String>) {
        self.request_id = Some(request_id.into());
    }

    /// Returns the deadline, if one was set.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Sets a deadline. An earlier existing deadline is kept.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
    }

    /// Returns the time left until the deadline, if one was set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the authenticated user.
    #[must_use]
    pub const fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// Sets the authenticated user.
    pub fn set_user(&mut self, user: UserInfo) {
        self.user = Some(user);
    }

    /// Returns the active transaction ID.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Sets the active transaction ID.
    pub fn set_transaction_id(&mut self, transaction_id: impl Into<String>) {
        self.transaction_id = Some(transaction_id.into());
    }

    /// Returns a route parameter captured by the router.
    #[must_use]
    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    /// Returns all route parameters.
    #[must_use]
    pub const fn route_params(&self) -> &HashMap<String, String> {
        &self.route_params
    }

    /// Adds a route parameter.
    pub fn insert_route_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.route_params.insert(name.into(), value.into());
    }

    /// Returns the request's cancellation signal.
    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Returns `true` once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns the remote peer address, if known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns when the request started processing.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the typed extensions.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns the typed extensions mutably.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
