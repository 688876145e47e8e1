//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value is out of range or malformed.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `server.bind_addr`.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A required value is absent.
    #[error("missing required configuration field: {field}")]
    MissingField {
        /// Dotted path of the field.
        field: String,
    },

    /// An environment variable could not be applied.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The variable name.
        var: String,
        /// What was expected.
        reason: String,
    },

    /// A runtime component rejected the configuration.
    #[error("cannot build {component} from configuration")]
    Build {
        /// Component being built, e.g. `token maker`.
        component: &'static str,
        /// The component's error.
        #[source]
        source: dfs_http_core::Error,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Creates an environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a component construction failure.
    pub fn build(component: &'static str, source: dfs_http_core::Error) -> Self {
        Self::Build { component, source }
    }

    /// Dotted path of the offending field, when the error names one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { field, .. } | Self::MissingField { field } => Some(field),
            Self::EnvParseError { .. } | Self::Build { .. } => None,
        }
    }
}

impl From<ConfigError> for dfs_http_core::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Build { source, .. } => source,
            other => {
                let message = other.to_string();
                Self::wrap(other, dfs_http_core::ErrorCode::InvalidArgument, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("server.bind_addr", "not a socket address");
        assert!(err.to_string().contains("server.bind_addr"));
        assert!(err.to_string().contains("not a socket address"));
        assert_eq!(err.field(), Some("server.bind_addr"));
    }

    #[test]
    fn test_missing_field_error() {
        let err = ConfigError::missing_field("auth.token_secret");
        assert!(err.to_string().contains("auth.token_secret"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("DFS__SERVER__READ_TIMEOUT_SECS", "expected integer");
        assert!(err.to_string().contains("DFS__SERVER__READ_TIMEOUT_SECS"));
        assert!(err.to_string().contains("expected integer"));
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_into_core_error() {
        let err: dfs_http_core::Error = ConfigError::missing_field("auth.token_secret").into();
        assert!(err.is_code(dfs_http_core::ErrorCode::InvalidArgument));

        let source = dfs_http_core::Error::invalid_argument("secret too short");
        let err: dfs_http_core::Error = ConfigError::build("token maker", source).into();
        assert_eq!(err.message(), "secret too short");
    }
}
