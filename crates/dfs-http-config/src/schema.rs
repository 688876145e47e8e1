//! Configuration schema types.
//!
//! Every section deserializes with defaults for missing fields and rejects
//! unknown ones. Durations are plain integers with the unit in the field name.

use serde::{Deserialize, Serialize};

/// HTTP server section.
///
/// # Example
///
/// ```
/// use dfs_http_config::ServerSection;
///
/// let server = ServerSection::default();
/// assert_eq!(server.bind_addr, "0.0.0.0:8080");
/// assert_eq!(server.read_timeout_secs, 15);
/// assert!(server.tls.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Listen address, e.g. `0.0.0.0:8080`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Time allowed to receive request headers.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Time allowed to read the body and produce the response.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Keep-alive connections idle this long are closed. 0 disables.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Drain deadline for graceful shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Serve TLS with these files.
    #[serde(default)]
    pub tls: Option<TlsSection>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
            tls: None,
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_read_timeout() -> u64 {
    15
}

fn default_write_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// PEM certificate chain and private key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    /// Certificate chain file.
    pub cert: String,
    /// Private key file.
    pub key: String,
}

/// Token authentication section.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// HMAC secret, at least 32 bytes. Usually supplied through the environment.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Lifetime of issued tokens.
    #[serde(default = "default_token_expiration")]
    pub token_expiration_minutes: u64,

    /// `iss` claim written and required, if set.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Path prefixes reachable without a token.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_expiration_minutes: default_token_expiration(),
            issuer: None,
            public_paths: default_public_paths(),
        }
    }
}

impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("token_expiration_minutes", &self.token_expiration_minutes)
            .field("issuer", &self.issuer)
            .field("public_paths", &self.public_paths)
            .finish()
    }
}

fn default_token_expiration() -> u64 {
    60
}

fn default_public_paths() -> Vec<String> {
    dfs_http_middleware::stages::auth::DEFAULT_PUBLIC_PREFIXES
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Outbound client section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    /// Base URL of the service called.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-attempt timeout.
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_client_timeout(),
            retry: RetrySection::default(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_client_timeout() -> u64 {
    30
}

/// Client retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_interval")]
    pub base_interval_ms: u64,

    /// Upper bound on a single delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_interval_ms: default_base_interval(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_interval() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    5_000
}

/// Per-client rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    /// Install the rate limiter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per window and client.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Window length.
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_limit(),
            window_secs: default_window(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    100
}

fn default_window() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Human-readable.
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err("expected 'json' or 'pretty'".to_string()),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Install a subscriber.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives, e.g. `info` or `dfs_http_server=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_fill_missing_fields() {
        let server: ServerSection = serde_json::from_str(r#"{"bind_addr":"127.0.0.1:9000"}"#).unwrap();
        assert_eq!(server.bind_addr, "127.0.0.1:9000");
        assert_eq!(server.write_timeout_secs, 30);
        assert_eq!(server.idle_timeout_secs, 60);
        assert_eq!(server.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<ServerSection, _> = serde_json::from_str(r#"{"bind_adr":"x"}"#);
        assert!(result.unwrap_err().to_string().contains("bind_adr"));

        let result: Result<RetrySection, _> = serde_json::from_str(r#"{"jitter":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_auth_defaults() {
        let auth = AuthSection::default();
        assert!(auth.token_secret.is_none());
        assert_eq!(auth.token_expiration_minutes, 60);
        assert!(auth.public_paths.iter().any(|p| p == "/health"));
    }

    #[test]
    fn test_auth_debug_hides_secret() {
        let auth = AuthSection {
            token_secret: Some("super-secret-value".to_string()),
            ..AuthSection::default()
        };
        let debug = format!("{auth:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_log_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        let section: LoggingSection = serde_json::from_str(r#"{"format":"pretty"}"#).unwrap();
        assert_eq!(section.format, LogFormat::Pretty);
    }

    #[test]
    fn test_client_defaults() {
        let client = ClientSection::default();
        assert_eq!(client.timeout_secs, 30);
        assert_eq!(client.retry.max_retries, 3);
        assert_eq!(client.retry.base_interval_ms, 500);
        assert_eq!(client.retry.max_backoff_ms, 5_000);
    }
}
