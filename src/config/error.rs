//! Configuration Error Types
//!
//! Errors raised while locating, parsing and validating the agent
//! configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Base configuration file not found in the configuration directory
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Invalid YAML syntax or shape in a configuration file
    #[error("Invalid YAML in configuration file '{file_path}': {error}")]
    InvalidYaml { file_path: String, error: String },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// `UPDATE_AGENT__*` override could not be applied
    #[error("Failed to apply environment override '{key}': {reason}")]
    EnvironmentOverrideError { key: String, reason: String },

    /// Sources merged but did not deserialize into the agent configuration
    #[error("Failed to build configuration: {error}")]
    BuildError { error: String },
}

impl ConfigurationError {
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    pub fn invalid_yaml(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self::InvalidYaml {
            file_path: file_path.into(),
            error: error.into(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    pub fn environment_override_error(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvironmentOverrideError {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        match error {
            config::ConfigError::FileParse { uri, cause } => Self::InvalidYaml {
                file_path: uri.unwrap_or_else(|| "<unknown>".to_string()),
                error: cause.to_string(),
            },
            config::ConfigError::Type {
                key: Some(key),
                expected,
                ..
            } => Self::EnvironmentOverrideError {
                reason: format!("expected {expected}"),
                key,
            },
            other => Self::BuildError {
                error: other.to_string(),
            },
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors_render_context() {
        let err = ConfigurationError::invalid_value(
            "agent.poll_interval_ms",
            "0",
            "must be positive",
        );
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'agent.poll_interval_ms': must be positive"
        );

        let err = ConfigurationError::missing_required_field("agent.name", "agent configuration");
        assert!(err.to_string().contains("agent.name"));
    }

    #[test]
    fn test_config_crate_errors_are_wrapped() {
        let err: ConfigurationError = config::ConfigError::NotFound("retry".to_string()).into();
        assert!(matches!(err, ConfigurationError::BuildError { .. }));
    }
}
