//! The root configuration type and its conversions into runtime components.

use std::net::SocketAddr;
use std::time::Duration;

use dfs_http_auth::{PermissionChecker, TokenMaker};
use dfs_http_client::{ClientConfig, RetryPolicy};
use dfs_http_middleware::stages::{AuthMiddleware, RateLimitBuilder, RateLimitMiddleware};
use dfs_http_server::TlsFiles;
use dfs_http_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::{
    AuthSection, ClientSection, ConfigError, LogFormat, LoggingSection, RateLimitSection, ServerSection,
};

/// Shortest accepted token secret, in bytes.
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

/// Complete toolkit configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer environment overrides
/// on top of defaults, then convert sections into the runtime types.
///
/// # Example
///
/// ```
/// use dfs_http_config::DfsHttpConfig;
///
/// let config = DfsHttpConfig::default();
/// assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
/// let server = config.server_config();
/// assert_eq!(server.bind_addr(), "0.0.0.0:8080");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct DfsHttpConfig {
    /// HTTP server.
    #[serde(default)]
    pub server: ServerSection,

    /// Token authentication.
    #[serde(default)]
    pub auth: AuthSection,

    /// Outbound client.
    #[serde(default)]
    pub client: ClientSection,

    /// Rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitSection,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DfsHttpConfig {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// `InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_auth()?;
        self.validate_client()?;
        self.validate_rate_limit()?;

        dfs_http_telemetry::logging::create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.bind_addr",
                format!("invalid socket address: {}", server.bind_addr),
            ));
        }
        if server.read_timeout_secs == 0 {
            return Err(ConfigError::invalid_value("server.read_timeout_secs", "must be positive"));
        }
        if server.write_timeout_secs == 0 {
            return Err(ConfigError::invalid_value("server.write_timeout_secs", "must be positive"));
        }
        if server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value("server.max_body_bytes", "must be positive"));
        }
        if let Some(tls) = &server.tls {
            if tls.cert.is_empty() {
                return Err(ConfigError::missing_field("server.tls.cert"));
            }
            if tls.key.is_empty() {
                return Err(ConfigError::missing_field("server.tls.key"));
            }
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<(), ConfigError> {
        let auth = &self.auth;
        if let Some(secret) = &auth.token_secret {
            if secret.len() < MIN_TOKEN_SECRET_LEN {
                return Err(ConfigError::invalid_value(
                    "auth.token_secret",
                    format!("must be at least {MIN_TOKEN_SECRET_LEN} bytes"),
                ));
            }
        }
        if auth.token_expiration_minutes == 0 {
            return Err(ConfigError::invalid_value("auth.token_expiration_minutes", "must be positive"));
        }
        if let Some(path) = auth.public_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::invalid_value(
                "auth.public_paths",
                format!("{path:?} must start with '/'"),
            ));
        }
        Ok(())
    }

    fn validate_client(&self) -> Result<(), ConfigError> {
        let client = &self.client;
        if !(client.base_url.starts_with("http://") || client.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                "client.base_url",
                format!("expected an http(s) URL, got {:?}", client.base_url),
            ));
        }
        if client.timeout_secs == 0 {
            return Err(ConfigError::invalid_value("client.timeout_secs", "must be positive"));
        }
        if client.retry.base_interval_ms > client.retry.max_backoff_ms {
            return Err(ConfigError::invalid_value(
                "client.retry.base_interval_ms",
                "must not exceed client.retry.max_backoff_ms",
            ));
        }
        Ok(())
    }

    fn validate_rate_limit(&self) -> Result<(), ConfigError> {
        let rate_limit = &self.rate_limit;
        if !rate_limit.enabled {
            return Ok(());
        }
        if rate_limit.limit == 0 {
            return Err(ConfigError::invalid_value("rate_limit.limit", "must be positive"));
        }
        if rate_limit.window_secs == 0 {
            return Err(ConfigError::invalid_value("rate_limit.window_secs", "must be positive"));
        }
        Ok(())
    }

    /// Verbose, human-readable logging and a local bind address.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.bind_addr = "127.0.0.1:8080".to_string();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config
    }

    /// JSON logging at `info`.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config
    }

    /// Builds the server configuration.
    #[must_use]
    pub fn server_config(&self) -> dfs_http_server::ServerConfig {
        let server = &self.server;
        let mut builder = dfs_http_server::ServerConfig::builder()
            .bind_addr(server.bind_addr.clone())
            .read_timeout(Duration::from_secs(server.read_timeout_secs))
            .write_timeout(Duration::from_secs(server.write_timeout_secs))
            .idle_timeout(Duration::from_secs(server.idle_timeout_secs))
            .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
            .max_body_bytes(server.max_body_bytes);
        if let Some(tls) = &server.tls {
            builder = builder.tls(TlsFiles::new(&tls.cert, &tls.key));
        }
        builder.build()
    }

    /// Builds the client configuration.
    ///
    /// # Errors
    ///
    /// `Build` when the retry policy is inconsistent.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let client = &self.client;
        let retry = RetryPolicy::new(
            client.retry.max_retries,
            Duration::from_millis(client.retry.base_interval_ms),
            Duration::from_millis(client.retry.max_backoff_ms),
        )
        .map_err(|e| ConfigError::build("retry policy", e))?;
        Ok(ClientConfig::builder(client.base_url.clone())
            .timeout(Duration::from_secs(client.timeout_secs))
            .retry(retry)
            .build())
    }

    /// A rate limiter builder with the configured limit and window.
    #[must_use]
    pub fn rate_limit_builder(&self) -> RateLimitBuilder {
        RateLimitMiddleware::builder()
            .limit(self.rate_limit.limit)
            .window(Duration::from_secs(self.rate_limit.window_secs))
    }

    /// The rate limiter, or `None` when disabled.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<RateLimitMiddleware> {
        self.rate_limit.enabled.then(|| self.rate_limit_builder().build())
    }

    /// Builds the token maker.
    ///
    /// # Errors
    ///
    /// `MissingField` without a secret, `Build` when the secret is rejected.
    pub fn token_maker(&self) -> Result<TokenMaker, ConfigError> {
        let secret = self
            .auth
            .token_secret
            .as_ref()
            .ok_or_else(|| ConfigError::missing_field("auth.token_secret"))?;
        let maker = TokenMaker::new(secret.as_bytes().to_vec()).map_err(|e| ConfigError::build("token maker", e))?;
        Ok(match &self.auth.issuer {
            Some(issuer) => maker.with_issuer(issuer.clone()),
            None => maker,
        })
    }

    /// Lifetime of issued tokens.
    #[must_use]
    pub fn token_ttl(&self) -> chrono::Duration {
        let minutes = i64::try_from(self.auth.token_expiration_minutes).unwrap_or(i64::MAX / 60_000);
        chrono::Duration::minutes(minutes)
    }

    /// Authentication middleware using the configured token maker, the
    /// default permission rules and the configured public paths.
    ///
    /// # Errors
    ///
    /// See [`token_maker`](Self::token_maker).
    pub fn auth_middleware(&self) -> Result<AuthMiddleware, ConfigError> {
        Ok(AuthMiddleware::new(self.token_maker()?)
            .with_permissions(PermissionChecker::default_rules())
            .with_public_prefixes(self.auth.public_paths.clone()))
    }

    /// Logging setup for [`dfs_http_telemetry::init_logging`].
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let base = match self.logging.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            ..base
        }
    }
}
