//! Client configuration.

use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::retry::RetryPolicy;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `User-Agent`.
pub const DEFAULT_USER_AGENT: &str = concat!("dfs-http-client/", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    timeout: Duration,
    default_headers: HeaderMap,
    bearer_token: Option<String>,
    user_agent: String,
    retry: RetryPolicy,
}

impl ClientConfig {
    /// Starts a configuration for the service at `base_url`.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Timeout for a single attempt.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Headers attached to every request.
    #[must_use]
    pub const fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Token sent as `Authorization: Bearer …`, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// `User-Agent` header value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                base_url: base_url.into(),
                timeout: DEFAULT_TIMEOUT,
                default_headers: HeaderMap::new(),
                bearer_token: None,
                user_agent: DEFAULT_USER_AGENT.to_owned(),
                retry: RetryPolicy::default(),
            },
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.default_headers.insert(name, value);
        self
    }

    /// Replaces the default headers.
    #[must_use]
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.config.default_headers = headers;
        self
    }

    /// Sends `token` as a bearer token.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.bearer_token = Some(token.into());
        self
    }

    /// Overrides the `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::builder("http://localhost:8080").build();
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.default_headers().is_empty());
        assert!(config.bearer_token().is_none());
        assert!(config.user_agent().starts_with("dfs-http-client/"));
        assert_eq!(*config.retry(), RetryPolicy::default());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::builder("http://meta:9000")
            .timeout(Duration::from_secs(2))
            .default_header(HeaderName::from_static("x-cluster"), HeaderValue::from_static("east"))
            .bearer_token("abc")
            .user_agent("dfs-cli/1.0")
            .retry(RetryPolicy::none())
            .build();
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.default_headers()["x-cluster"], "east");
        assert_eq!(config.bearer_token(), Some("abc"));
        assert_eq!(config.user_agent(), "dfs-cli/1.0");
        assert_eq!(config.retry().max_retries(), 0);
    }
}
