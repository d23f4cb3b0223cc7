//! # Workflow Data
//!
//! The single live record of the deployment the agent is working on, plus
//! the serializable snapshot persisted across process restarts.
//!
//! `operation_in_progress` is true exactly while one handler phase runs;
//! the engine never starts another phase while it is set.

use super::states::{RestartState, UpdateAction, UpdateState, WorkflowStep};
use crate::constants::workflow::WORKFLOW_ID_TIMESTAMP_FORMAT;
use crate::models::{ContentData, WorkflowHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct WorkflowData {
    /// Timestamp-derived id, regenerated for every accepted deployment
    pub workflow_id: Option<String>,
    pub handle: Option<WorkflowHandle>,
    pub current_action: UpdateAction,
    pub last_reported_state: UpdateState,
    /// Deployment id of the last workflow that completed successfully
    pub last_completed_workflow_id: Option<String>,
    pub operation_in_progress: bool,
    pub operation_cancelled: bool,
    pub system_reboot_state: RestartState,
    pub agent_restart_state: RestartState,
    pub work_folder: Option<PathBuf>,
    pub startup_idle_call_sent: bool,
}

impl WorkflowData {
    pub fn content(&self) -> Option<&ContentData> {
        self.handle.as_ref().and_then(|h| h.content.as_ref())
    }

    pub fn current_step(&self) -> WorkflowStep {
        self.handle
            .as_ref()
            .map_or(WorkflowStep::Undefined, |h| h.current_step)
    }

    pub fn deployment_id(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.deployment_id.as_str())
    }

    pub fn is_restart_pending(&self) -> bool {
        self.system_reboot_state.is_pending() || self.agent_restart_state.is_pending()
    }

    /// A restart was handed to the platform and has not come back yet
    pub fn is_restart_in_progress(&self) -> bool {
        self.system_reboot_state == RestartState::InProgress
            || self.agent_restart_state == RestartState::InProgress
    }

    /// Clear the per-operation flags after a phase finished
    pub fn clear_in_progress_and_cancel_requested(&mut self) {
        self.operation_in_progress = false;
        self.operation_cancelled = false;
    }

    /// Drop everything tied to the current deployment
    pub fn clear_workflow(&mut self) {
        self.workflow_id = None;
        self.handle = None;
        self.current_action = UpdateAction::Undefined;
        self.work_folder = None;
        self.clear_in_progress_and_cancel_requested();
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.workflow_id.clone(),
            last_reported_state: self.last_reported_state,
            handle: self.handle.clone(),
            last_completed_workflow_id: self.last_completed_workflow_id.clone(),
            system_reboot_state: self.system_reboot_state,
            agent_restart_state: self.agent_restart_state,
            work_folder: self.work_folder.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Restore reporting state from a snapshot
    ///
    /// An in-flight phase is never resumed: the flags stay cleared and the
    /// deployment restarts from the beginning if the cloud still wants it.
    pub fn restore(&mut self, snapshot: WorkflowSnapshot) {
        self.workflow_id = snapshot.workflow_id;
        self.last_reported_state = snapshot.last_reported_state;
        self.handle = snapshot.handle.map(|mut handle| {
            handle.pending_replacement = None;
            handle
        });
        self.last_completed_workflow_id = snapshot.last_completed_workflow_id;
        self.system_reboot_state = snapshot.system_reboot_state;
        self.agent_restart_state = snapshot.agent_restart_state;
        self.work_folder = snapshot.work_folder;
        self.current_action = self
            .handle
            .as_ref()
            .map_or(UpdateAction::Undefined, |h| h.action);
        self.clear_in_progress_and_cancel_requested();
    }
}

/// Persisted subset of [`WorkflowData`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: Option<String>,
    pub last_reported_state: UpdateState,
    pub handle: Option<WorkflowHandle>,
    pub last_completed_workflow_id: Option<String>,
    pub system_reboot_state: RestartState,
    pub agent_restart_state: RestartState,
    pub work_folder: Option<PathBuf>,
    pub saved_at: DateTime<Utc>,
}

/// Generates `yymmddHHMMSS` + milliseconds workflow ids
///
/// Ids are strictly increasing per generator, so two deployments accepted in
/// the same millisecond still get distinct sandboxes.
#[derive(Debug, Default)]
pub struct WorkflowIdGenerator {
    last: Option<u64>,
}

impl WorkflowIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let candidate = format!(
            "{}{:03}",
            now.format(WORKFLOW_ID_TIMESTAMP_FORMAT),
            now.timestamp_subsec_millis().min(999)
        );
        let numeric = candidate.parse::<u64>().unwrap_or_default();
        let next = match self.last {
            Some(last) if numeric <= last => last + 1,
            _ => numeric,
        };
        self.last = Some(next);
        format!("{next:015}")
    }
}
