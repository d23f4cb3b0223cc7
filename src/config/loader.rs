//! Configuration loader.
//!
//! Layers three sources with the `config` crate, later ones winning:
//!
//! 1. `update-agent.yaml` (or `.yml`) in the configuration directory
//! 2. `update-agent.{environment}.yaml`, when present
//! 3. `UPDATE_AGENT__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::AgentConfig;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "update-agent";
const ENV_PREFIX: &str = "UPDATE_AGENT";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_DIR: &str = "/etc/update-agent";

#[derive(Debug)]
pub struct ConfigManager {
    config: AgentConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment().to_lowercase();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Like [`Self::load_from_directory_with_env`], reading environment
    /// overrides from `overrides` instead of the process environment
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "⚙️ CONFIG: Loading configuration"
        );

        let base_file = Self::find_config_file(&config_directory)?;
        let override_file =
            config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml"));

        let config: AgentConfig = Config::builder()
            .add_source(File::from(base_file.as_path()).format(FileFormat::Yaml))
            .add_source(
                File::from(override_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(overrides),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        let manager = ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        };

        debug!(
            config = %manager.debug_config(),
            "⚙️ CONFIG: Configuration loaded"
        );
        info!(
            environment = %manager.environment,
            agent = %manager.config.agent.name,
            poll_interval_ms = manager.config.agent.poll_interval_ms,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(manager))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        sanitize_json_recursive(&mut value, &["password", "secret", "token", "credential", "auth"]);
        value
    }

    fn default_config_directory() -> PathBuf {
        env::var("UPDATE_AGENT_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let candidates: Vec<PathBuf> = ["yaml", "yml"]
            .iter()
            .map(|ext| config_directory.join(format!("{CONFIG_FILE_STEM}.{ext}")))
            .collect();

        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| ConfigurationError::config_file_not_found(candidates))
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                if sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern))
                {
                    *val = serde_json::Value::String("[MASKED]".to_string());
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}
