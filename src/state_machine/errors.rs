use crate::state_machine::states::{UpdateState, WorkflowStep};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while interpreting or driving a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid update payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Missing required field '{field}' in update payload")]
    MissingField { field: String },

    #[error("Step {step} expects last reported state {expected}, found {actual}")]
    UnexpectedState {
        step: WorkflowStep,
        expected: UpdateState,
        actual: UpdateState,
    },

    #[error("An operation is already in progress for workflow {workflow_id}")]
    OperationInProgress { workflow_id: String },

    #[error("No workflow is active")]
    NoActiveWorkflow,
}

impl WorkflowError {
    pub fn invalid_payload<S: Into<String>>(reason: S) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

/// Errors raised by workflow state persistence
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to read workflow state from '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write workflow state to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workflow state is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
