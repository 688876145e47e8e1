//! Bearer token authentication and permission checks.
//!
//! For every request outside the public prefixes:
//!
//! 1. find a token (header, `auth_token` cookie, `token` query parameter)
//! 2. verify it
//! 3. resolve the caller through the [`UserManager`], or from the token
//!    claims with the `user` role when no manager is configured
//! 4. check the permission rules against the path and the method's action
//!    ([`PermissionChecker::default_rules`] unless replaced; no matching rule
//!    means deny)
//! 5. store the caller in the context
//!
//! Failures answer `401` with `WWW-Authenticate: Bearer` (missing, invalid
//! or expired token) or `403` (rules deny the request).

use std::sync::Arc;

use dfs_http_auth::{extract_token, PermissionChecker, TokenMaker, TokenPayload};
use dfs_http_core::services::UserManager;
use dfs_http_core::{response, BoxFuture, Error, ErrorCode, Request, RequestContext, Response, Role, UserInfo};

use crate::middleware::{Middleware, Next};

/// Prefixes that bypass authentication by default.
pub const DEFAULT_PUBLIC_PREFIXES: [&str; 5] = [
    "/health",
    "/metrics",
    "/api/v1/auth/login",
    "/api/v1/auth/register",
    "/status",
];

/// Authenticates requests and enforces permission rules.
pub struct AuthMiddleware {
    tokens: TokenMaker,
    users: Option<Arc<dyn UserManager>>,
    permissions: PermissionChecker,
    public_prefixes: Vec<String>,
}

impl AuthMiddleware {
    /// Authenticates with `tokens`, no user manager, the default
    /// permission rules and the default public prefixes.
    #[must_use]
    pub fn new(tokens: TokenMaker) -> Self {
        Self {
            tokens,
            users: None,
            permissions: PermissionChecker::default_rules(),
            public_prefixes: DEFAULT_PUBLIC_PREFIXES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Resolves callers through a user manager.
    #[must_use]
    pub fn with_user_manager(mut self, users: Arc<dyn UserManager>) -> Self {
        self.users = Some(users);
        self
    }

    /// Replaces the permission rules.
    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionChecker) -> Self {
        self.permissions = permissions;
        self
    }

    /// Returns the permission rules in force.
    #[must_use]
    pub const fn permissions(&self) -> &PermissionChecker {
        &self.permissions
    }

    /// Replaces the public prefixes.
    #[must_use]
    pub fn with_public_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `true` if `path` skips authentication.
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    async fn authenticate(&self, request: &Request) -> Result<UserInfo, Error> {
        let token = extract_token(request)
            .ok_or_else(|| Error::unauthenticated("missing authentication token"))?;

        let payload = self.tokens.verify(&token).map_err(|err| match err.code() {
            ErrorCode::ExpiredToken => Error::new(ErrorCode::ExpiredToken, "token has expired"),
            _ => Error::new(ErrorCode::InvalidToken, "invalid token").with_cause(err),
        })?;

        let user = self.resolve(&payload).await?;

        let path = request.uri().path();
        if !self.permissions.check_method(&user, path, request.method()) {
            return Err(Error::permission_denied("permission denied")
                .with_field("resource", path)
                .with_field("method", request.method().as_str()));
        }
        Ok(user)
    }

    async fn resolve(&self, payload: &TokenPayload) -> Result<UserInfo, Error> {
        let Some(users) = &self.users else {
            return Ok(UserInfo::new(&payload.subject, &payload.username).with_role(Role::User));
        };
        match users.get_user(&payload.subject).await {
            Ok(user) => Ok(user),
            Err(err) if err.is_not_found() => Err(Error::new(ErrorCode::InvalidToken, "invalid token")),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field("tokens", &self.tokens)
            .field("users", &self.users.is_some())
            .field("permissions", &self.permissions)
            .field("public_prefixes", &self.public_prefixes)
            .finish()
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.is_public(request.uri().path()) {
                return next.run(ctx, request).await;
            }

            match self.authenticate(&request).await {
                Ok(user) => {
                    tracing::debug!(
                        request_id = ctx.request_id().unwrap_or("-"),
                        user_id = %user.user_id,
                        "request authenticated"
                    );
                    ctx.set_user(user);
                    next.run(ctx, request).await
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = ctx.request_id().unwrap_or("-"),
                        path = %request.uri().path(),
                        code = %err.code(),
                        "request rejected"
                    );
                    response::error(&err, ctx.request_id())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{body_json, ok_handler, request, run};
    use bytes::Bytes;
    use dfs_http_auth::{Action, InMemoryUserStore, PermissionRule};
    use dfs_http_core::{BoxedHandler, HandlerResult};
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use std::collections::BTreeSet;

    fn maker() -> TokenMaker {
        TokenMaker::new(b"0123456789abcdef0123456789abcdef".to_vec()).unwrap()
    }

    fn with_bearer(method: Method, uri: &str, token: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn echo_user() -> BoxedHandler {
        Arc::new(|ctx: RequestContext, _req: Request| async move {
            let user = ctx.user().cloned().ok_or_else(|| Error::internal("no user"))?;
            HandlerResult::Ok(response::ok(user))
        })
    }

    #[tokio::test]
    async fn test_public_prefix_skips_auth() {
        let auth = AuthMiddleware::new(maker());
        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, request(Method::GET, "/health"), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn test_missing_token() {
        let auth = AuthMiddleware::new(maker());
        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, request(Method::GET, "/api/v1/files/a"), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "missing authentication token");
    }

    #[tokio::test]
    async fn test_expired_and_invalid_tokens_have_distinct_messages() {
        let maker = maker();
        let auth = AuthMiddleware::new(maker.clone());
        let (expired, _) = maker.create("alice", "u-1", chrono::Duration::minutes(-1)).unwrap();

        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, with_bearer(Method::GET, "/api/files/x", &expired), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "EXPIRED_TOKEN");
        assert_eq!(body["error"]["message"], "token has expired");

        let response = run(&auth, &mut ctx, with_bearer(Method::GET, "/api/files/x", "a.b.c"), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
        assert_eq!(body["error"]["message"], "invalid token");
    }

    #[tokio::test]
    async fn test_claims_fallback_user() {
        let maker = maker();
        let auth = AuthMiddleware::new(maker.clone());
        let (token, _) = maker.create("alice", "u-1", chrono::Duration::minutes(5)).unwrap();

        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, with_bearer(Method::GET, "/api/v1/files/a", &token), echo_user()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = ctx.user().unwrap();
        assert_eq!(user.user_id, "u-1");
        assert!(user.has_role(Role::User));
    }

    #[tokio::test]
    async fn test_user_manager_and_permissions() {
        let maker = maker();
        let store = Arc::new(InMemoryUserStore::new());
        let guest = store
            .insert("guest", "guest-password", BTreeSet::from([Role::Guest]))
            .unwrap();
        let auth = AuthMiddleware::new(maker.clone())
            .with_user_manager(store)
            .with_permissions(PermissionChecker::with_rules(vec![PermissionRule::allow(
                Role::Guest,
                "/api/v1/files/*",
                &[Action::Read],
            )]));
        let (token, _) = maker
            .create(&guest.username, &guest.user_id, chrono::Duration::minutes(5))
            .unwrap();

        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, with_bearer(Method::GET, "/api/v1/files/a", &token), echo_user()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["username"], "guest");

        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, with_bearer(Method::DELETE, "/api/v1/files/a", &token), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn test_default_rules_deny_uncovered_paths() {
        let maker = maker();
        let auth = AuthMiddleware::new(maker.clone());
        assert_eq!(auth.permissions(), &PermissionChecker::default_rules());
        let (token, _) = maker.create("alice", "u-1", chrono::Duration::minutes(5)).unwrap();

        let mut ctx = RequestContext::new();
        let response = run(
            &auth,
            &mut ctx,
            with_bearer(Method::DELETE, "/api/v1/admin/everything", &token),
            ok_handler(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["code"], "PERMISSION_DENIED");
        assert!(ctx.user().is_none());

        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, with_bearer(Method::GET, "/api/v1/cluster/nodes", &token), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_invalid() {
        let maker = maker();
        let auth = AuthMiddleware::new(maker.clone()).with_user_manager(Arc::new(InMemoryUserStore::new()));
        let (token, _) = maker.create("ghost", "missing", chrono::Duration::minutes(5)).unwrap();
        let mut ctx = RequestContext::new();
        let response = run(&auth, &mut ctx, with_bearer(Method::GET, "/x", &token), ok_handler()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_public_prefixes() {
        let auth = AuthMiddleware::new(maker()).with_public_prefixes(["/open"]);
        assert!(auth.is_public("/open/data"));
        assert!(!auth.is_public("/health"));
        assert_eq!(auth.name(), "auth");
    }
}
