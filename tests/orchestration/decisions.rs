use proptest::prelude::*;
use update_agent_core::orchestration::{
    get_workflow_step, is_retry_applicable, is_workflow_complete, should_not_report_to_cloud,
};
use update_agent_core::state_machine::{UpdateAction, UpdateState, WorkflowStep};

const ALL_STATES: [UpdateState; 12] = [
    UpdateState::None,
    UpdateState::Idle,
    UpdateState::DownloadStarted,
    UpdateState::DownloadSucceeded,
    UpdateState::BackupStarted,
    UpdateState::BackupSucceeded,
    UpdateState::InstallStarted,
    UpdateState::InstallSucceeded,
    UpdateState::ApplyStarted,
    UpdateState::RestoreStarted,
    UpdateState::DeploymentInProgress,
    UpdateState::Failed,
];

#[test]
fn test_only_cloud_states_are_reported() {
    let reported: Vec<UpdateState> = ALL_STATES
        .iter()
        .copied()
        .filter(|state| !should_not_report_to_cloud(*state))
        .collect();

    assert!(reported.iter().all(|state| matches!(
        state,
        UpdateState::Idle | UpdateState::DeploymentInProgress | UpdateState::Failed
    )));
    assert!(reported.contains(&UpdateState::DeploymentInProgress));
    assert!(reported.contains(&UpdateState::Failed));
}

#[test]
fn test_only_process_deployment_starts_a_workflow() {
    assert_eq!(
        get_workflow_step(UpdateAction::ProcessDeployment),
        WorkflowStep::ProcessDeployment
    );
    assert_eq!(get_workflow_step(UpdateAction::Cancel), WorkflowStep::Undefined);
    assert_eq!(get_workflow_step(UpdateAction::Undefined), WorkflowStep::Undefined);
}

#[test]
fn test_retry_token_table() {
    assert!(!is_retry_applicable(None, None));
    assert!(is_retry_applicable(None, Some("t1")));
    assert!(!is_retry_applicable(Some("t1"), None));
    assert!(!is_retry_applicable(Some("t1"), Some("t1")));
    assert!(is_retry_applicable(Some("t1"), Some("t2")));
}

proptest! {
    #[test]
    fn retry_applies_exactly_when_tokens_differ(
        current in "[a-z0-9]{0,8}",
        new in "[a-z0-9]{0,8}",
    ) {
        prop_assert_eq!(is_retry_applicable(Some(&current), Some(&new)), current != new);
        prop_assert!(is_retry_applicable(None, Some(&new)));
        prop_assert!(!is_retry_applicable(Some(&current), None));
    }
}
