use crate::config::ConfigurationError;
use crate::execution::BackgroundWorkerError;
use crate::orchestration::TransportError;
use crate::platform::PlatformError;
use crate::registry::RegistryError;
use crate::state_machine::errors::{PersistenceError, WorkflowError};
use thiserror::Error;

/// Top-level error of the update agent core
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Handler registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Background worker error: {0}")]
    Background(#[from] BackgroundWorkerError),

    #[error("Agent is not running: {0}")]
    NotRunning(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
