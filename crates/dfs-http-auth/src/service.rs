//! Authentication endpoint handlers.
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /api/v1/auth/login` | [`AuthService::login`] |
//! | `POST /api/v1/auth/register` | [`AuthService::register`] |
//! | `POST /api/v1/auth/refresh` | [`AuthService::refresh`] |
//! | `POST /api/v1/auth/logout` | [`AuthService::logout`] |
//! | `GET /api/v1/auth/me` | [`AuthService::me`] |
//!
//! Login and register are public; the others expect the auth middleware to
//! have run, although refresh and logout verify the presented token
//! themselves.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dfs_http_core::services::UserManager;
use dfs_http_core::{
    json_body, response, Error, HandlerResult, Request, RequestContext, Role, UserInfo,
};
use serde::{Deserialize, Serialize};

use crate::extract::extract_token;
use crate::token::{TokenMaker, TokenPayload};

/// Username and password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Issued token with its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// The authenticated user.
    pub user: UserInfo,
}

/// Login, registration and session handlers.
#[derive(Clone)]
pub struct AuthService {
    tokens: TokenMaker,
    users: Arc<dyn UserManager>,
    token_ttl: Duration,
}

impl AuthService {
    /// Default token lifetime in seconds.
    pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

    /// Creates the service.
    pub fn new(tokens: TokenMaker, users: Arc<dyn UserManager>) -> Self {
        Self {
            tokens,
            users,
            token_ttl: Duration::seconds(Self::DEFAULT_TOKEN_TTL_SECS),
        }
    }

    /// Sets the lifetime of issued tokens.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Returns the token maker.
    #[must_use]
    pub const fn tokens(&self) -> &TokenMaker {
        &self.tokens
    }

    /// Returns the user manager.
    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserManager> {
        &self.users
    }

    /// Exchanges credentials for a token.
    pub async fn login(&self, _ctx: RequestContext, request: Request) -> HandlerResult {
        let credentials: Credentials = json_body(request).await?;
        let user = self
            .users
            .authenticate(&credentials.username, &credentials.password)
            .await?;
        tracing::info!(user_id = %user.user_id, username = %user.username, "login succeeded");
        Ok(response::ok(self.issue(user)?))
    }

    /// Registers a user with the `user` role.
    pub async fn register(&self, _ctx: RequestContext, request: Request) -> HandlerResult {
        let credentials: Credentials = json_body(request).await?;
        let user = self
            .users
            .create_user(
                &credentials.username,
                &credentials.password,
                BTreeSet::from([Role::User]),
            )
            .await?;
        Ok(response::created(user))
    }

    /// Swaps a valid token for a fresh one and revokes the old one.
    pub async fn refresh(&self, _ctx: RequestContext, request: Request) -> HandlerResult {
        let payload = self.presented_token(&request)?;
        let user = self.resolve(&payload).await?;
        self.tokens.revoke(&payload);
        Ok(response::ok(self.issue(user)?))
    }

    /// Revokes the presented token.
    pub async fn logout(&self, _ctx: RequestContext, request: Request) -> HandlerResult {
        let payload = self.presented_token(&request)?;
        self.tokens.revoke(&payload);
        tracing::info!(user_id = %payload.subject, token_id = %payload.id, "logged out");
        Ok(response::ok(serde_json::json!({ "logged_out": true })))
    }

    /// Returns the authenticated user.
    pub async fn me(&self, ctx: RequestContext, _request: Request) -> HandlerResult {
        ctx.user()
            .cloned()
            .map(response::ok)
            .ok_or_else(|| Error::unauthenticated("missing authentication token"))
    }

    fn presented_token(&self, request: &Request) -> Result<TokenPayload, Error> {
        let token = extract_token(request)
            .ok_or_else(|| Error::unauthenticated("missing authentication token"))?;
        self.tokens.verify(&token)
    }

    async fn resolve(&self, payload: &TokenPayload) -> Result<UserInfo, Error> {
        match self.users.get_user(&payload.subject).await {
            Ok(user) => Ok(user),
            Err(err) if err.is_not_found() => Err(Error::unauthenticated("user no longer exists")),
            Err(err) => Err(err),
        }
    }

    fn issue(&self, user: UserInfo) -> Result<TokenResponse, Error> {
        let (token, payload) = self
            .tokens
            .create(&user.username, &user.user_id, self.token_ttl)?;
        Ok(TokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_at: payload.expires_at,
            user,
        })
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("tokens", &self.tokens)
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}
