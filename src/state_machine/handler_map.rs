//! Workflow handler map.
//!
//! One entry per step: the state reported when the step succeeds or fails
//! and the step the workflow moves to next. `WorkflowStep::Undefined` as the
//! next step ends the workflow.

use super::states::{UpdateState, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerMapEntry {
    pub step: WorkflowStep,
    /// `None` leaves the last cloud-visible state untouched
    pub next_state_on_success: Option<UpdateState>,
    pub next_step_on_success: WorkflowStep,
    pub next_state_on_failure: UpdateState,
    pub next_step_on_failure: WorkflowStep,
}

const HANDLER_MAP: [HandlerMapEntry; 6] = [
    HandlerMapEntry {
        step: WorkflowStep::ProcessDeployment,
        next_state_on_success: Some(UpdateState::DeploymentInProgress),
        next_step_on_success: WorkflowStep::Download,
        next_state_on_failure: UpdateState::Failed,
        next_step_on_failure: WorkflowStep::Undefined,
    },
    HandlerMapEntry {
        step: WorkflowStep::Download,
        next_state_on_success: Some(UpdateState::DownloadSucceeded),
        next_step_on_success: WorkflowStep::Backup,
        next_state_on_failure: UpdateState::Failed,
        next_step_on_failure: WorkflowStep::Undefined,
    },
    // A failed backup ends the workflow; handlers that want to continue
    // anyway report BACKUP_SUCCESS instead.
    HandlerMapEntry {
        step: WorkflowStep::Backup,
        next_state_on_success: Some(UpdateState::BackupSucceeded),
        next_step_on_success: WorkflowStep::Install,
        next_state_on_failure: UpdateState::Failed,
        next_step_on_failure: WorkflowStep::Undefined,
    },
    HandlerMapEntry {
        step: WorkflowStep::Install,
        next_state_on_success: Some(UpdateState::InstallSucceeded),
        next_step_on_success: WorkflowStep::Apply,
        next_state_on_failure: UpdateState::Failed,
        next_step_on_failure: WorkflowStep::Restore,
    },
    // No ApplySucceeded state: a successful apply returns straight to Idle.
    HandlerMapEntry {
        step: WorkflowStep::Apply,
        next_state_on_success: Some(UpdateState::Idle),
        next_step_on_success: WorkflowStep::Undefined,
        next_state_on_failure: UpdateState::Failed,
        next_step_on_failure: WorkflowStep::Restore,
    },
    HandlerMapEntry {
        step: WorkflowStep::Restore,
        next_state_on_success: None,
        next_step_on_success: WorkflowStep::Undefined,
        next_state_on_failure: UpdateState::Failed,
        next_step_on_failure: WorkflowStep::Undefined,
    },
];

/// Entry for `step`; `None` for `WorkflowStep::Undefined`
pub fn entry_for(step: WorkflowStep) -> Option<&'static HandlerMapEntry> {
    HANDLER_MAP.iter().find(|entry| entry.step == step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::decisions::is_workflow_complete;

    #[test]
    fn test_success_path_reaches_end_of_workflow() {
        let mut step = WorkflowStep::ProcessDeployment;
        let mut visited = vec![step];
        while let Some(entry) = entry_for(step) {
            if is_workflow_complete(entry.next_step_on_success) {
                break;
            }
            step = entry.next_step_on_success;
            visited.push(step);
        }
        assert_eq!(
            visited,
            vec![
                WorkflowStep::ProcessDeployment,
                WorkflowStep::Download,
                WorkflowStep::Backup,
                WorkflowStep::Install,
                WorkflowStep::Apply,
            ]
        );
    }

    #[test]
    fn test_install_and_apply_failures_restore() {
        for step in [WorkflowStep::Install, WorkflowStep::Apply] {
            let entry = entry_for(step).unwrap();
            assert_eq!(entry.next_state_on_failure, UpdateState::Failed);
            assert_eq!(entry.next_step_on_failure, WorkflowStep::Restore);
        }
        let restore = entry_for(WorkflowStep::Restore).unwrap();
        assert!(restore.next_state_on_success.is_none());
        assert!(is_workflow_complete(restore.next_step_on_failure));
    }

    #[test]
    fn test_undefined_has_no_entry() {
        assert!(entry_for(WorkflowStep::Undefined).is_none());
    }
}
