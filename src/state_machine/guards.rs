//! Expected-state guards.
//!
//! Every handler phase runs only when the last reported state is the one the
//! previous step leaves behind. A mismatch means a stale or reordered command
//! reached the engine; the phase fails instead of running out of order.

use super::errors::WorkflowError;
use super::states::{UpdateState, WorkflowStep};

/// State the workflow must be in before `step` may run
pub fn expected_state_for(step: WorkflowStep) -> Option<UpdateState> {
    match step {
        WorkflowStep::Download => Some(UpdateState::DeploymentInProgress),
        WorkflowStep::Backup => Some(UpdateState::DownloadSucceeded),
        WorkflowStep::Install => Some(UpdateState::BackupSucceeded),
        WorkflowStep::Apply => Some(UpdateState::InstallSucceeded),
        WorkflowStep::Restore => Some(UpdateState::Failed),
        WorkflowStep::ProcessDeployment | WorkflowStep::Undefined => None,
    }
}

/// State reported (locally) when `step` starts
pub fn started_state_for(step: WorkflowStep) -> Option<UpdateState> {
    match step {
        WorkflowStep::Download => Some(UpdateState::DownloadStarted),
        WorkflowStep::Backup => Some(UpdateState::BackupStarted),
        WorkflowStep::Install => Some(UpdateState::InstallStarted),
        WorkflowStep::Apply => Some(UpdateState::ApplyStarted),
        WorkflowStep::Restore => Some(UpdateState::RestoreStarted),
        WorkflowStep::ProcessDeployment | WorkflowStep::Undefined => None,
    }
}

pub fn check_expected_state(step: WorkflowStep, actual: UpdateState) -> Result<(), WorkflowError> {
    match expected_state_for(step) {
        Some(expected) if expected != actual => Err(WorkflowError::UnexpectedState {
            step,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}
