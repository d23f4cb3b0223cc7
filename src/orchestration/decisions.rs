//! Stateless orchestration policy.
//!
//! Maps requested actions to workflow steps, decides which states reach the
//! cloud, and tells a genuine retry apart from a redelivered command.

use crate::state_machine::states::{UpdateAction, UpdateState, WorkflowStep};

/// First workflow step for a requested action
///
/// Cancel never starts a step: it only signals the in-flight operation or
/// resets the agent to idle.
pub fn get_workflow_step(action: UpdateAction) -> WorkflowStep {
    match action {
        UpdateAction::ProcessDeployment => WorkflowStep::ProcessDeployment,
        UpdateAction::Cancel | UpdateAction::Undefined => WorkflowStep::Undefined,
    }
}

/// A workflow is complete once its handler map declares no further step
pub fn is_workflow_complete(auto_transition_step: WorkflowStep) -> bool {
    auto_transition_step == WorkflowStep::Undefined
}

/// Only `Idle`, `DeploymentInProgress` and `Failed` are reported to the cloud
pub fn should_not_report_to_cloud(state: UpdateState) -> bool {
    !matches!(
        state,
        UpdateState::Idle | UpdateState::DeploymentInProgress | UpdateState::Failed
    )
}

/// Whether `new_token` denotes a new attempt of the current deployment
///
/// | current | new  | result            |
/// |---------|------|-------------------|
/// | none    | none | false             |
/// | none    | some | true (first retry)|
/// | some    | none | false             |
/// | some    | some | current != new    |
pub fn is_retry_applicable(current_token: Option<&str>, new_token: Option<&str>) -> bool {
    match (current_token, new_token) {
        (None, Some(_)) => true,
        (Some(current), Some(new)) => current != new,
        _ => false,
    }
}
