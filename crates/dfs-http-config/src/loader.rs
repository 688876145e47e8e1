//! Layered configuration loading.
//!
//! Layers, later ones winning:
//!
//! 1. a preset ([`DfsHttpConfig::default`], development or production)
//! 2. a typed value supplied by the caller, deserialized from any format
//! 3. environment variables `PREFIX__SECTION__KEY`

use std::env;
use std::str::FromStr;

use crate::{ConfigError, DfsHttpConfig, LogFormat, TlsSection};

/// Configuration loader.
///
/// # Example
///
/// ```
/// use dfs_http_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_development()
///     .with_vars([("DFS__SERVER__BIND_ADDR", "127.0.0.1:9000")])
///     .with_env_prefix("DFS")
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
/// assert_eq!(config.logging.level, "debug");
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: DfsHttpConfig,
    env_prefix: Option<String>,
    vars: Option<Vec<(String, String)>>,
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = DfsHttpConfig::default();
        self
    }

    /// Resets to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = DfsHttpConfig::development();
        self
    }

    /// Resets to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = DfsHttpConfig::production();
        self
    }

    /// Replaces the current layer with a caller-supplied configuration,
    /// typically deserialized from the deployment's own config source.
    #[must_use]
    pub fn with_config(mut self, config: DfsHttpConfig) -> Self {
        self.config = config;
        self
    }

    /// Applies `PREFIX__SECTION__KEY` variables on [`load`](Self::load).
    ///
    /// For prefix `DFS`: `DFS__SERVER__BIND_ADDR`, `DFS__CLIENT__RETRY__MAX_RETRIES`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    #[must_use]
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Applies overrides and validates.
    ///
    /// # Errors
    ///
    /// `EnvParseError` for a malformed or unknown variable under the prefix,
    /// any validation error from [`DfsHttpConfig::validate`].
    pub fn load(mut self) -> Result<DfsHttpConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let marker = format!("{prefix}__");
            let vars: Vec<(String, String)> = match self.vars.take() {
                Some(vars) => vars,
                None => env::vars().collect(),
            };
            let mut matching: Vec<_> = vars.into_iter().filter(|(k, _)| k.starts_with(&marker)).collect();
            matching.sort();
            for (key, value) in matching {
                apply_env_var(&mut self.config, &key, &value, &marker)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the current layer without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> DfsHttpConfig {
        self.config
    }
}

fn apply_env_var(config: &mut DfsHttpConfig, key: &str, value: &str, marker: &str) -> Result<(), ConfigError> {
    let path = key
        .strip_prefix(marker)
        .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
    let parts: Vec<&str> = path.split("__").collect();

    match parts.as_slice() {
        ["SERVER", "BIND_ADDR"] => config.server.bind_addr = value.to_string(),
        ["SERVER", "READ_TIMEOUT_SECS"] => config.server.read_timeout_secs = parse(key, value)?,
        ["SERVER", "WRITE_TIMEOUT_SECS"] => config.server.write_timeout_secs = parse(key, value)?,
        ["SERVER", "IDLE_TIMEOUT_SECS"] => config.server.idle_timeout_secs = parse(key, value)?,
        ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => config.server.shutdown_timeout_secs = parse(key, value)?,
        ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse(key, value)?,
        ["SERVER", "TLS", "CERT"] => tls(config).cert = value.to_string(),
        ["SERVER", "TLS", "KEY"] => tls(config).key = value.to_string(),

        ["AUTH", "TOKEN_SECRET"] => config.auth.token_secret = optional(value),
        ["AUTH", "TOKEN_EXPIRATION_MINUTES"] => config.auth.token_expiration_minutes = parse(key, value)?,
        ["AUTH", "ISSUER"] => config.auth.issuer = optional(value),
        ["AUTH", "PUBLIC_PATHS"] => {
            config.auth.public_paths = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        ["CLIENT", "BASE_URL"] => config.client.base_url = value.to_string(),
        ["CLIENT", "TIMEOUT_SECS"] => config.client.timeout_secs = parse(key, value)?,
        ["CLIENT", "RETRY", "MAX_RETRIES"] => config.client.retry.max_retries = parse(key, value)?,
        ["CLIENT", "RETRY", "BASE_INTERVAL_MS"] => config.client.retry.base_interval_ms = parse(key, value)?,
        ["CLIENT", "RETRY", "MAX_BACKOFF_MS"] => config.client.retry.max_backoff_ms = parse(key, value)?,

        ["RATE_LIMIT", "ENABLED"] => config.rate_limit.enabled = parse_bool(key, value)?,
        ["RATE_LIMIT", "LIMIT"] => config.rate_limit.limit = parse(key, value)?,
        ["RATE_LIMIT", "WINDOW_SECS"] => config.rate_limit.window_secs = parse(key, value)?,

        ["LOGGING", "ENABLED"] => config.logging.enabled = parse_bool(key, value)?,
        ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
        ["LOGGING", "FORMAT"] => {
            config.logging.format =
                LogFormat::from_str(value).map_err(|reason| ConfigError::env_parse_error(key, reason))?;
        }

        _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
    }
    Ok(())
}

fn tls(config: &mut DfsHttpConfig) -> &mut TlsSection {
    config.server.tls.get_or_insert_with(|| TlsSection {
        cert: String::new(),
        key: String::new(),
    })
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected a non-negative integer"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<DfsHttpConfig, ConfigError> {
        ConfigLoader::new()
            .with_vars(vars.iter().copied())
            .with_env_prefix("dfs")
            .load()
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_presets() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        let config = ConfigLoader::new().with_development().with_defaults().load().unwrap();
        assert_eq!(config, DfsHttpConfig::default());
    }

    #[test]
    fn test_env_overrides_every_section() {
        let config = load(&[
            ("DFS__SERVER__BIND_ADDR", "127.0.0.1:9000"),
            ("DFS__SERVER__WRITE_TIMEOUT_SECS", "5"),
            ("DFS__SERVER__TLS__CERT", "/tls/crt.pem"),
            ("DFS__SERVER__TLS__KEY", "/tls/key.pem"),
            ("DFS__AUTH__TOKEN_SECRET", "0123456789abcdef0123456789abcdef"),
            ("DFS__AUTH__PUBLIC_PATHS", "/health, /metrics"),
            ("DFS__CLIENT__RETRY__MAX_RETRIES", "7"),
            ("DFS__RATE_LIMIT__ENABLED", "off"),
            ("DFS__LOGGING__FORMAT", "pretty"),
            ("OTHER__SERVER__BIND_ADDR", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.server.write_timeout_secs, 5);
        let tls = config.server.tls.unwrap();
        assert_eq!((tls.cert.as_str(), tls.key.as_str()), ("/tls/crt.pem", "/tls/key.pem"));
        assert!(config.auth.token_secret.is_some());
        assert_eq!(config.auth.public_paths, ["/health", "/metrics"]);
        assert_eq!(config.client.retry.max_retries, 7);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_env_overrides_layer_on_supplied_config() {
        let mut base = DfsHttpConfig::default();
        base.rate_limit.limit = 10;
        let config = ConfigLoader::new()
            .with_config(base)
            .with_vars([("DFS__RATE_LIMIT__WINDOW_SECS", "1")])
            .with_env_prefix("DFS")
            .load()
            .unwrap();
        assert_eq!(config.rate_limit.limit, 10);
        assert_eq!(config.rate_limit.window_secs, 1);
    }

    #[test]
    fn test_malformed_values() {
        let err = load(&[("DFS__SERVER__READ_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { ref var, .. } if var == "DFS__SERVER__READ_TIMEOUT_SECS"));

        assert!(load(&[("DFS__RATE_LIMIT__ENABLED", "maybe")]).is_err());
        assert!(load(&[("DFS__LOGGING__FORMAT", "xml")]).is_err());
        assert!(load(&[("DFS__SERVER__PORT", "80")]).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let err = load(&[("DFS__SERVER__TLS__CERT", "/tls/crt.pem")]).unwrap_err();
        assert_eq!(err.field(), Some("server.tls.key"));

        let err = load(&[("DFS__AUTH__TOKEN_SECRET", "short")]).unwrap_err();
        assert_eq!(err.field(), Some("auth.token_secret"));
    }

    #[test]
    fn test_empty_value_clears_optional() {
        let mut base = DfsHttpConfig::default();
        base.auth.issuer = Some("dfs".to_string());
        let config = ConfigLoader::new()
            .with_config(base)
            .with_vars([("DFS__AUTH__ISSUER", "")])
            .with_env_prefix("DFS")
            .load()
            .unwrap();
        assert!(config.auth.issuer.is_none());
    }

    #[test]
    fn test_load_unvalidated() {
        let mut broken = DfsHttpConfig::default();
        broken.server.bind_addr = "nowhere".to_string();
        let config = ConfigLoader::new().with_config(broken).load_unvalidated();
        assert!(config.validate().is_err());
    }
}
