//! # Agent Configuration
//!
//! Typed configuration for the update agent core, loaded by
//! [`ConfigManager`] from YAML files and `UPDATE_AGENT__*` environment
//! variables.
//!
//! ## Sections
//!
//! ```yaml
//! agent:
//!   name: update-agent
//!   downloads_folder: /var/lib/update-agent/downloads
//!   poll_interval_ms: 100
//! retry:
//!   server_transient:
//!     max_retries: 10
//!     initial_delay_unit_ms: 1000
//! operations:
//!   request_timeout_secs: 180
//!   enrollment:
//!     operation_interval_secs: 3600
//! workflow:
//!   persist_path: /var/lib/update-agent/workflow-state.json
//!   honor_force_update: true
//! logging:
//!   log_dir: log
//! ```
//!
//! Every field has a default, so a partial file only overrides what it
//! names. Missing retry entries fall back to the built-in retry defaults.

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::{operations, workflow};
use crate::resilience::{OperationTimings, RetryParams, RetryParamsTable};
use crate::state_machine::WorkflowSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent: AgentRuntimeConfig,
    pub retry: RetryParamsTable,
    pub operations: OperationsConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

/// Identity and polling of the agent process
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentRuntimeConfig {
    pub name: String,
    pub downloads_folder: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            name: "update-agent".to_string(),
            downloads_folder: PathBuf::from(workflow::DEFAULT_DOWNLOADS_FOLDER),
            poll_interval_ms: workflow::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl AgentRuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Scheduling of the retriable operations the agent runs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// Time to wait for the response to a published request
    pub request_timeout_secs: i64,
    pub enrollment: OperationTimings,
    pub root_key_refresh: OperationTimings,
    pub topic_subscribe: OperationTimings,
    /// Local copy of the root key package
    pub root_key_store_path: PathBuf,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: operations::DEFAULT_REQUEST_TIMEOUT_SECS,
            enrollment: OperationTimings {
                operation_interval_secs: operations::ENROLLMENT_INTERVAL_SECS,
                expiration_secs: Some(operations::ENROLLMENT_EXPIRATION_SECS),
                ..OperationTimings::default()
            },
            root_key_refresh: OperationTimings {
                operation_interval_secs: operations::ROOT_KEY_REFRESH_INTERVAL_SECS,
                ..OperationTimings::default()
            },
            topic_subscribe: OperationTimings {
                operation_interval_secs: operations::TOPIC_SUBSCRIBE_INTERVAL_SECS,
                ..OperationTimings::default()
            },
            root_key_store_path: PathBuf::from("/var/lib/update-agent/rootkeys.json"),
        }
    }
}

/// Workflow engine behavior and device-side commands
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Where the workflow snapshot is kept across reboots
    pub persist_path: PathBuf,
    pub honor_force_update: bool,
    pub reboot_command: Vec<String>,
    pub agent_restart_command: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            persist_path: PathBuf::from(workflow::DEFAULT_STATE_FILE),
            honor_force_update: true,
            reboot_command: vec!["systemctl".to_string(), "reboot".to_string()],
            agent_restart_command: vec![
                "systemctl".to_string(),
                "restart".to_string(),
                "update-agent".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(crate::logging::DEFAULT_LOG_DIR),
        }
    }
}

impl AgentConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.agent.name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "agent.name",
                "agent configuration",
            ));
        }

        if self.agent.downloads_folder.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "agent.downloads_folder",
                "agent configuration",
            ));
        }

        if self.agent.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "agent.poll_interval_ms",
                "0",
                "poll interval must be greater than 0",
            ));
        }

        if self.operations.request_timeout_secs <= 0 {
            return Err(ConfigurationError::invalid_value(
                "operations.request_timeout_secs",
                self.operations.request_timeout_secs.to_string(),
                "request timeout must be greater than 0",
            ));
        }

        for (name, timings) in [
            ("enrollment", &self.operations.enrollment),
            ("root_key_refresh", &self.operations.root_key_refresh),
            ("topic_subscribe", &self.operations.topic_subscribe),
        ] {
            validate_timings(name, timings)?;
        }

        for (name, params) in [
            ("default", &self.retry.default),
            ("client_transient", &self.retry.client_transient),
            ("client_unrecoverable", &self.retry.client_unrecoverable),
            ("server_transient", &self.retry.server_transient),
            ("server_unrecoverable", &self.retry.server_unrecoverable),
        ] {
            validate_retry_params(name, params)?;
        }

        if self.workflow.persist_path.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "workflow.persist_path",
                "workflow configuration",
            ));
        }

        Ok(())
    }

    /// Engine settings derived from the `agent` and `workflow` sections
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            downloads_folder: self.agent.downloads_folder.clone(),
            honor_force_update: self.workflow.honor_force_update,
        }
    }
}

fn validate_timings(name: &str, timings: &OperationTimings) -> Result<(), ConfigurationError> {
    if timings.operation_timeout_secs < 0 {
        return Err(ConfigurationError::invalid_value(
            format!("operations.{name}.operation_timeout_secs"),
            timings.operation_timeout_secs.to_string(),
            "timeout cannot be negative",
        ));
    }
    if timings.operation_interval_secs < 0 {
        return Err(ConfigurationError::invalid_value(
            format!("operations.{name}.operation_interval_secs"),
            timings.operation_interval_secs.to_string(),
            "interval cannot be negative",
        ));
    }
    if let Some(expiration) = timings.expiration_secs.filter(|secs| *secs <= 0) {
        return Err(ConfigurationError::invalid_value(
            format!("operations.{name}.expiration_secs"),
            expiration.to_string(),
            "expiration must be greater than 0",
        ));
    }
    Ok(())
}

// Other invalid backoff inputs fall back to the fallback wait at runtime
fn validate_retry_params(name: &str, params: &RetryParams) -> Result<(), ConfigurationError> {
    if !(0.0..=100.0).contains(&params.max_jitter_percent) {
        return Err(ConfigurationError::invalid_value(
            format!("retry.{name}.max_jitter_percent"),
            params.max_jitter_percent.to_string(),
            "jitter must be between 0 and 100",
        ));
    }
    if params.fallback_wait_time_secs <= 0 {
        return Err(ConfigurationError::invalid_value(
            format!("retry.{name}.fallback_wait_time_secs"),
            params.fallback_wait_time_secs.to_string(),
            "fallback wait must be greater than 0",
        ));
    }
    Ok(())
}
