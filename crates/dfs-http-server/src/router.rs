//! Request routing and path matching.
//!
//! Patterns are paths with `{name}` placeholders. Each placeholder matches
//! one non-empty path segment; everything else is matched literally. The
//! compiled matcher is an anchored regular expression with one named
//! capture per placeholder.
//!
//! Dispatch picks the first registered route whose method and pattern
//! match. Captures land in [`RequestContext::route_param`]. A request that
//! matches nothing goes to the not-found handler, which answers `404` with
//! the standard error envelope unless replaced.
//!
//! Routes may be registered on [groups](Group): the group prefix is
//! prepended to each pattern, and middleware added to a group runs only for
//! that group's routes (and those of nested groups), inside the router-wide
//! middleware.
//!
//! # Example
//!
//! ```rust
//! use dfs_http_core::{response, HandlerResult, Request, RequestContext};
//! use dfs_http_server::Router;
//! use http::Method;
//!
//! async fn get_file(ctx: RequestContext, _req: Request) -> HandlerResult {
//!     let id = ctx.route_param("id").unwrap_or_default().to_string();
//!     Ok(response::ok(id))
//! }
//!
//! let mut router = Router::new();
//! router.group("/api/v1").get("/files/{id}", get_file).unwrap();
//!
//! let matched = router.match_route(&Method::GET, "/api/v1/files/42").unwrap();
//! assert_eq!(matched.pattern(), "/api/v1/files/{id}");
//! assert_eq!(matched.param("id"), Some("42"));
//! assert!(router.match_route(&Method::POST, "/api/v1/files/42").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use dfs_http_core::{response, BoxedHandler, Error, Handler, HandlerResult, Request, RequestContext, Response, Result};
use dfs_http_middleware::{compose, Chain, Middleware, Next};
use http::Method;
use regex::Regex;

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pattern: String,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the full pattern of the matched route.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

struct Route {
    method: Method,
    pattern: String,
    matcher: Regex,
    names: Vec<String>,
    group: Option<usize>,
    handler: BoxedHandler,
}

impl Route {
    fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.matcher.captures(path)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|value| (name.clone(), value.as_str().to_string()))
                })
                .collect(),
        )
    }
}

struct GroupEntry {
    prefix: String,
    parent: Option<usize>,
    middleware: Chain,
}

/// Compiles a pattern into an anchored matcher and its placeholder names.
///
/// # Errors
///
/// `InvalidArgument` when the pattern does not start with `/`, a brace is
/// unbalanced, or a placeholder name is empty, malformed or repeated.
pub fn compile_pattern(pattern: &str) -> Result<(Regex, Vec<String>)> {
    let invalid = |reason: &str| {
        Error::invalid_argument(format!("invalid route pattern {pattern:?}: {reason}"))
            .with_field("pattern", pattern)
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let mut source = String::with_capacity(pattern.len() + 8);
    let mut names: Vec<String> = Vec::new();
    source.push('^');

    let mut rest = pattern;
    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(invalid("unbalanced '}'"));
        }
        source.push_str(&regex::escape(&rest[..open]));
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
        let name = &after[..close];
        if !is_identifier(name) {
            return Err(invalid("placeholder names must be identifiers"));
        }
        if names.iter().any(|existing| existing == name) {
            return Err(invalid("duplicate placeholder"));
        }
        source.push_str("(?P<");
        source.push_str(name);
        source.push_str(">[^/]+)");
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    source.push_str(&regex::escape(rest));
    source.push('$');

    let matcher = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;
    Ok((matcher, names))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn join(prefix: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        return prefix.to_string();
    }
    let prefix = prefix.trim_end_matches('/');
    if pattern.starts_with('/') {
        format!("{prefix}{pattern}")
    } else {
        format!("{prefix}/{pattern}")
    }
}

async fn default_not_found(_ctx: RequestContext, request: Request) -> HandlerResult {
    let path = request.uri().path();
    Err(Error::not_found(format!("no route for {} {path}", request.method())).with_field("path", path))
}

/// Method and pattern router with groups and per-group middleware.
pub struct Router {
    routes: Vec<Route>,
    groups: Vec<GroupEntry>,
    middleware: Chain,
    not_found: BoxedHandler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            groups: Vec::new(),
            middleware: Chain::new(),
            not_found: Arc::new(default_not_found),
        }
    }

    /// Registers a route.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed pattern, `AlreadyExists` when the
    /// method and pattern are already registered.
    pub fn handle<H: Handler>(&mut self, method: Method, pattern: &str, handler: H) -> Result<&mut Self> {
        self.insert(None, method, pattern.to_string(), Arc::new(handler))?;
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::PUT, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::PATCH, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::DELETE, pattern, handler)
    }

    /// Opens a group whose routes are registered under `prefix`.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        self.groups.push(GroupEntry {
            prefix: join("", prefix),
            parent: None,
            middleware: Chain::new(),
        });
        let index = self.groups.len() - 1;
        Group { router: self, index }
    }

    /// Adds middleware that wraps every route and the not-found handler.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Replaces the handler for requests that match no route.
    pub fn not_found<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.not_found = Arc::new(handler);
        self
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered `(method, pattern)` pairs, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> + '_ {
        self.routes.iter().map(|route| (&route.method, route.pattern.as_str()))
    }

    /// Finds the route for a request without running it.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.find(method, path).map(|(route, params)| RouteMatch {
            pattern: route.pattern.clone(),
            params,
        })
    }

    /// Runs a request through the router-wide middleware, the matched
    /// route's group middleware and its handler.
    pub async fn dispatch(&self, ctx: &mut RequestContext, request: Request) -> Response {
        let mut layers: Vec<&dyn Middleware> = self.middleware.iter().collect();

        let handler = match self.find(request.method(), request.uri().path()) {
            Some((route, params)) => {
                for (name, value) in params {
                    ctx.insert_route_param(name, value);
                }
                for group in self.lineage(route.group) {
                    layers.extend(group.middleware.iter());
                }
                Arc::clone(&route.handler)
            }
            None => Arc::clone(&self.not_found),
        };

        compose(layers, Next::endpoint(handler)).run(ctx, request).await
    }

    fn find(&self, method: &Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| route.captures(path).map(|params| (route, params)))
    }

    /// Groups from the outermost ancestor down to `group`.
    fn lineage(&self, group: Option<usize>) -> Vec<&GroupEntry> {
        let mut chain = Vec::new();
        let mut current = group;
        while let Some(index) = current {
            let entry = &self.groups[index];
            chain.push(entry);
            current = entry.parent;
        }
        chain.reverse();
        chain
    }

    fn insert(&mut self, group: Option<usize>, method: Method, pattern: String, handler: BoxedHandler) -> Result<()> {
        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.pattern == pattern)
        {
            return Err(Error::already_exists(format!("route {method} {pattern} is already registered"))
                .with_field("pattern", pattern.as_str()));
        }
        let (matcher, names) = compile_pattern(&pattern)?;
        tracing::debug!(%method, %pattern, "route registered");
        self.routes.push(Route {
            method,
            pattern,
            matcher,
            names,
            group,
            handler,
        });
        Ok(())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes().map(|(m, p)| format!("{m} {p}")).collect::<Vec<_>>())
            .field("middleware", &self.middleware)
            .field("groups", &self.groups.len())
            .finish()
    }
}

/// Registration handle for a route group.
///
/// Borrowed from [`Router::group`] or [`Group::group`].
pub struct Group<'r> {
    router: &'r mut Router,
    index: usize,
}

impl Group<'_> {
    /// Returns the full prefix of this group.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.router.groups[self.index].prefix
    }

    /// Registers a route under the group prefix.
    ///
    /// # Errors
    ///
    /// Same as [`Router::handle`].
    pub fn handle<H: Handler>(&mut self, method: Method, pattern: &str, handler: H) -> Result<&mut Self> {
        let full = join(self.prefix(), pattern);
        self.router.insert(Some(self.index), method, full, Arc::new(handler))?;
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::GET, pattern, handler)
    }

    /// Registers a `POST` route.
    pub fn post<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::POST, pattern, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::PUT, pattern, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::PATCH, pattern, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Self> {
        self.handle(Method::DELETE, pattern, handler)
    }

    /// Opens a nested group.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let full = join(self.prefix(), prefix);
        self.router.groups.push(GroupEntry {
            prefix: full,
            parent: Some(self.index),
            middleware: Chain::new(),
        });
        let index = self.router.groups.len() - 1;
        Group {
            router: &mut *self.router,
            index,
        }
    }

    /// Adds middleware for this group's routes and its nested groups.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.router.groups[self.index].middleware.push(Arc::new(middleware));
        self
    }
}

impl std::fmt::Debug for Group<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("prefix", &self.prefix()).finish()
    }
}
