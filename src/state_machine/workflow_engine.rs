//! # Workflow Engine
//!
//! Owns the [`WorkflowData`] of the device and drives one deployment at a
//! time through the handler map:
//!
//! ```text
//! ProcessDeployment ─▶ Download ─▶ Backup ─▶ Install ─▶ Apply ─▶ Idle
//!        │                 │          │         │         │
//!        └──── Failed ◀────┴──────────┘         └─────────┴──▶ Failed ─▶ Restore
//! ```
//!
//! ## Threading
//!
//! Every method runs on the single polling thread that owns the engine.
//! A phase that returns an in-progress result finishes later; its handler
//! reports through the [`WorkCompletionSender`](crate::execution::WorkCompletionSender)
//! in its [`PhaseContext`], and [`WorkflowEngine::do_work`] applies the
//! result on the next tick. Completions for a superseded workflow or step
//! are dropped.
//!
//! ## Reporting
//!
//! All state changes go through one reporting path that tracks
//! `last_reported_state` for every state but only forwards the states the
//! cloud accepts (`Idle`, `DeploymentInProgress`, `Failed`).

use super::errors::{PersistenceError, WorkflowError};
use super::guards::{check_expected_state, started_state_for};
use super::handler_map::{entry_for, HandlerMapEntry};
use super::persistence::WorkflowStatePersistence;
use super::states::{CancellationType, RestartState, UpdateAction, UpdateState, WorkflowStep};
use super::workflow_data::{WorkflowData, WorkflowIdGenerator};
use crate::constants::events;
use crate::events::{StateReport, StateReporter, WorkflowEventPublisher};
use crate::execution::{CancellationFlag, WorkCompletion, WorkCompletionQueue};
use crate::logging::log_workflow_operation;
use crate::models::{erc, AducResult, ResultCode, WorkflowHandle};
use crate::orchestration::decisions::{
    get_workflow_step, is_retry_applicable, is_workflow_complete, should_not_report_to_cloud,
};
use crate::platform::PlatformLayer;
use crate::registry::{ContentHandlerRegistry, PhaseContext, SharedContentHandler};
use crate::utils::clock::SharedClock;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Engine behavior that comes from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Parent folder of the per-workflow sandboxes
    pub downloads_folder: PathBuf,
    /// Honor the `forceUpdate` flag of a property update
    pub honor_force_update: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            downloads_folder: PathBuf::from(crate::constants::workflow::DEFAULT_DOWNLOADS_FOLDER),
            honor_force_update: true,
        }
    }
}

/// Collaborators the engine is built from
#[derive(Debug)]
pub struct WorkflowEngineParts {
    pub registry: Arc<ContentHandlerRegistry>,
    pub reporter: Box<dyn StateReporter>,
    pub platform: Box<dyn PlatformLayer>,
    pub clock: SharedClock,
    pub settings: WorkflowSettings,
}

#[derive(Debug)]
pub struct WorkflowEngine {
    data: WorkflowData,
    registry: Arc<ContentHandlerRegistry>,
    reporter: Box<dyn StateReporter>,
    platform: Box<dyn PlatformLayer>,
    persistence: Option<Box<dyn WorkflowStatePersistence>>,
    publisher: WorkflowEventPublisher,
    completions: WorkCompletionQueue,
    cancellation: CancellationFlag,
    /// Handler and inputs of the phase currently running
    active_handler: Option<SharedContentHandler>,
    active_phase: Option<PhaseContext>,
    workflow_ids: WorkflowIdGenerator,
    clock: SharedClock,
    settings: WorkflowSettings,
}

impl WorkflowEngine {
    pub fn new(parts: WorkflowEngineParts) -> Self {
        Self {
            data: WorkflowData::default(),
            registry: parts.registry,
            reporter: parts.reporter,
            platform: parts.platform,
            persistence: None,
            publisher: WorkflowEventPublisher::default(),
            completions: WorkCompletionQueue::new(),
            cancellation: CancellationFlag::new(),
            active_handler: None,
            active_phase: None,
            workflow_ids: WorkflowIdGenerator::new(),
            clock: parts.clock,
            settings: parts.settings,
        }
    }

    pub fn with_persistence(mut self, persistence: Box<dyn WorkflowStatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_event_publisher(mut self, publisher: WorkflowEventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Load the persisted snapshot, if any; returns whether one was found
    pub fn restore_persisted_state(&mut self) -> Result<bool, PersistenceError> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Ok(false);
        };
        match persistence.load()? {
            Some(snapshot) => {
                info!(
                    workflow_id = ?snapshot.workflow_id,
                    state = %snapshot.last_reported_state,
                    reboot = %snapshot.system_reboot_state,
                    agent_restart = %snapshot.agent_restart_state,
                    "💾 WORKFLOW: Restored persisted workflow state"
                );
                self.data.restore(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn data(&self) -> &WorkflowData {
        &self.data
    }

    pub fn last_reported_state(&self) -> UpdateState {
        self.data.last_reported_state
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.data.workflow_id.as_deref()
    }

    pub fn is_operation_in_progress(&self) -> bool {
        self.data.operation_in_progress
    }

    pub fn event_publisher(&self) -> &WorkflowEventPublisher {
        &self.publisher
    }

    // ------------------------------------------------------------------
    // Inbound commands
    // ------------------------------------------------------------------

    /// Handle a property update pushed by the transport
    ///
    /// An unparseable payload is reported as `Failed` and returned as an
    /// error; every other outcome (including ignored duplicates) is `Ok`.
    pub fn handle_property_update(
        &mut self,
        payload: &str,
        force_update: bool,
    ) -> Result<(), WorkflowError> {
        let mut next = match WorkflowHandle::from_property_update(payload) {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "📥 WORKFLOW: Invalid update action data");
                self.set_update_state_with_result(
                    UpdateState::Failed,
                    AducResult::failure(erc::INVALID_UPDATE_ACTION),
                );
                return Err(e);
            }
        };
        next.force_update = force_update || next.force_update;
        let next_action = next.action;

        info!(
            deployment_id = %next.deployment_id,
            action = %next_action,
            retry_token = ?next.retry_token(),
            "📥 WORKFLOW: Property update received"
        );

        if let Some(current) = self.data.handle.as_mut() {
            match next_action {
                UpdateAction::Cancel => {
                    if current.cancellation_type == CancellationType::None {
                        current.cancellation_type = CancellationType::Normal;
                        self.handle_update_action();
                    } else {
                        info!(
                            cancellation_type = %current.cancellation_type,
                            "📥 WORKFLOW: Ignoring duplicate cancel"
                        );
                    }
                    return Ok(());
                }
                UpdateAction::ProcessDeployment => {
                    let forced = next.force_update && self.settings.honor_force_update;
                    if !forced && current.is_same_deployment(&next) {
                        if !is_retry_applicable(current.retry_token(), next.retry_token()) {
                            info!(
                                deployment_id = %current.deployment_id,
                                current_token = ?current.retry_token(),
                                new_token = ?next.retry_token(),
                                "📥 WORKFLOW: Ignoring redelivered deployment"
                            );
                            return Ok(());
                        }
                        debug!(
                            new_token = ?next.retry_token(),
                            "📥 WORKFLOW: Retry is applicable"
                        );
                        current.update_retry_deployment(next.retry_token.clone());
                        self.handle_update_action();
                        return Ok(());
                    }

                    let state = self.data.last_reported_state;
                    let replaceable = state != UpdateState::Idle
                        && state != UpdateState::Failed
                        && current.current_step != WorkflowStep::Undefined;
                    if replaceable {
                        info!(
                            current = %current.deployment_id,
                            replacement = %next.deployment_id,
                            "🔀 WORKFLOW: Replacing in-flight deployment"
                        );
                        if self.data.operation_in_progress {
                            current.defer_replacement(next);
                            self.handle_update_action();
                            return Ok(());
                        }
                        self.adopt_deployment(next);
                        self.handle_update_action();
                        return Ok(());
                    }
                }
                UpdateAction::Undefined => {}
            }
        }

        // A new deployment, or a cancel with nothing to cancel
        if next_action == UpdateAction::Cancel {
            next.cancellation_type = CancellationType::Normal;
        }
        self.adopt_deployment(next);

        if self.data.startup_idle_call_sent {
            self.handle_update_action();
        } else {
            self.handle_startup_workflow_data();
        }
        Ok(())
    }

    /// Send the single startup report that re-synchronizes with the cloud
    ///
    /// Called by the host once it is connected, and implicitly by the first
    /// property update. Later calls are no-ops.
    pub fn handle_startup_workflow_data(&mut self) {
        if self.data.startup_idle_call_sent {
            debug!("🚀 WORKFLOW: Startup report already sent");
            return;
        }
        info!("🚀 WORKFLOW: Performing startup tasks");
        self.data.startup_idle_call_sent = true;

        let action = self.data.handle.as_ref().map(|h| h.action);
        match action {
            None | Some(UpdateAction::Undefined) => {
                info!("🚀 WORKFLOW: No pending update action");
                self.set_update_state_with_result(
                    UpdateState::Idle,
                    AducResult::success(ResultCode::SUCCESS),
                );
            }
            Some(UpdateAction::Cancel) => {
                info!("🚀 WORKFLOW: Cancel pending on startup, reporting Idle");
                self.set_update_state_with_result(
                    UpdateState::Idle,
                    AducResult::success(ResultCode::SUCCESS),
                );
            }
            Some(UpdateAction::ProcessDeployment) => {
                if self.is_installed() {
                    self.set_installed_update_id_and_go_to_idle();
                    return;
                }
                info!("🚀 WORKFLOW: Pending deployment, processing it");
                // Do not report Idle: the deployment resumes from the start
                self.data.last_reported_state = UpdateState::Idle;
                self.handle_update_action();
            }
        }
    }

    /// Apply asynchronous phase completions; call on every polling tick
    pub fn do_work(&mut self) {
        for completion in self.completions.drain() {
            if !self.is_current_completion(&completion) {
                debug!(
                    workflow_id = %completion.workflow_id,
                    step = %completion.step,
                    "📭 WORKFLOW: Dropping stale phase completion"
                );
                continue;
            }
            if completion.result.is_in_progress() {
                error!(
                    step = %completion.step,
                    "📭 WORKFLOW: Completion carried an in-progress result"
                );
                continue;
            }
            if self.complete_step(completion.step, completion.result) {
                self.transition_workflow();
            }
        }
    }

    /// The reboot requested by the workflow has happened
    pub fn on_system_restarted(&mut self) {
        if self.data.system_reboot_state == RestartState::None {
            return;
        }
        info!(state = %self.data.system_reboot_state, "🔄 WORKFLOW: System restarted");
        self.data.system_reboot_state = RestartState::None;
        self.complete_after_restart();
    }

    /// The agent restart requested by the workflow has happened
    pub fn on_agent_restarted(&mut self) {
        if self.data.agent_restart_state == RestartState::None {
            return;
        }
        info!(state = %self.data.agent_restart_state, "🔄 WORKFLOW: Agent restarted");
        self.data.agent_restart_state = RestartState::None;
        self.complete_after_restart();
    }

    // ------------------------------------------------------------------
    // Update action handling
    // ------------------------------------------------------------------

    fn handle_update_action(&mut self) {
        let Some(handle) = self.data.handle.as_mut() else {
            return;
        };
        let action = handle.action;
        let cancellation_type = handle.cancellation_type;
        let replace_or_retry = matches!(
            cancellation_type,
            CancellationType::Replacement | CancellationType::Retry
        );
        let is_cancel =
            action == UpdateAction::Cancel || cancellation_type == CancellationType::Normal;

        if is_cancel || (action == UpdateAction::ProcessDeployment && replace_or_retry) {
            if self.data.operation_in_progress {
                info!(
                    action = %action,
                    cancellation_type = %cancellation_type,
                    "🛑 WORKFLOW: Cancelling in-progress operation"
                );
                self.data.operation_cancelled = true;
                self.request_cancel();
                return;
            }

            self.data.operation_cancelled = false;
            handle.cancellation_type = CancellationType::None;

            if is_cancel {
                info!("🛑 WORKFLOW: Cancel with no operation in progress, returning to Idle");
                self.set_update_state_with_result(
                    UpdateState::Idle,
                    AducResult::success(ResultCode::SUCCESS),
                );
                return;
            }

            info!(
                cancellation_type = %cancellation_type,
                "🔁 WORKFLOW: Processing replacement/retry now"
            );
            handle.reset_for_retry();
        }

        let honor_force = self.settings.honor_force_update;
        let is_duplicate = self.data.last_completed_workflow_id.as_deref()
            == Some(handle.deployment_id.as_str())
            && !(handle.force_update && honor_force);
        if is_duplicate {
            debug!(
                deployment_id = %handle.deployment_id,
                "📥 WORKFLOW: Ignoring completed deployment"
            );
            return;
        }

        self.data.current_action = action;

        if self.is_installed() {
            self.set_installed_update_id_and_go_to_idle();
            return;
        }

        let next_step = get_workflow_step(action);
        if let Some(handle) = self.data.handle.as_mut() {
            handle.current_step = next_step;
        }

        if next_step == WorkflowStep::ProcessDeployment {
            self.cleanup_previous_sandboxes();
        }

        self.transition_workflow();
    }

    /// Make `next` the current deployment under a fresh workflow id
    fn adopt_deployment(&mut self, next: WorkflowHandle) {
        if let Some(previous) = self.data.workflow_id.take() {
            self.destroy_sandbox(&previous);
        }
        let workflow_id = self.workflow_ids.next_id(self.clock.now());
        info!(
            workflow_id = %workflow_id,
            deployment_id = %next.deployment_id,
            action = %next.action,
            "📥 WORKFLOW: Deployment accepted"
        );
        log_workflow_operation(
            "accept",
            Some(&workflow_id),
            Some(&next.deployment_id),
            None,
            "accepted",
            None,
        );
        self.publisher.publish(
            events::WORKFLOW_ACCEPTED,
            json!({
                "workflow_id": workflow_id,
                "deployment_id": next.deployment_id,
                "action": next.action,
            }),
        );
        self.data.work_folder = Some(self.settings.downloads_folder.join(&workflow_id));
        self.data.workflow_id = Some(workflow_id);
        self.data.handle = Some(next);
        self.active_handler = None;
        self.active_phase = None;
        self.persist();
    }

    fn request_cancel(&mut self) {
        self.cancellation.cancel();
        self.publisher.publish(
            events::WORKFLOW_CANCEL_REQUESTED,
            json!({
                "workflow_id": self.data.workflow_id,
                "cancellation_type": self.data.handle.as_ref().map(|h| h.cancellation_type),
            }),
        );
        match (self.active_handler.as_ref(), self.active_phase.as_ref()) {
            (Some(handler), Some(phase)) => {
                let result = handler.cancel(phase);
                info!(
                    step = %phase.step,
                    result = %result,
                    "🛑 WORKFLOW: Cancel requested from handler"
                );
            }
            _ => warn!("🛑 WORKFLOW: Cancel requested without an active phase"),
        }
    }

    // ------------------------------------------------------------------
    // Step execution
    // ------------------------------------------------------------------

    /// Run steps until one goes asynchronous or the workflow ends
    fn transition_workflow(&mut self) {
        loop {
            let step = self.data.current_step();
            if entry_for(step).is_none() {
                debug!(step = %step, "⚙️ WORKFLOW: No step to run");
                return;
            }

            debug!(step = %step, "⚙️ WORKFLOW: Processing step");
            self.data.operation_in_progress = true;
            let result = self.invoke_step(step);

            if result.is_in_progress() {
                debug!(step = %step, "⏳ WORKFLOW: Step continues asynchronously");
                return;
            }
            if !self.complete_step(step, result) {
                return;
            }
        }
    }

    fn invoke_step(&mut self, step: WorkflowStep) -> AducResult {
        info!(workflow_id = ?self.data.workflow_id, step = %step, "⚙️ WORKFLOW: Workflow step");
        self.publisher.publish(
            events::WORKFLOW_STEP_STARTED,
            json!({ "workflow_id": self.data.workflow_id, "step": step }),
        );

        if step == WorkflowStep::ProcessDeployment {
            return AducResult::success(ResultCode::DEPLOYMENT_IN_PROGRESS_SUCCESS);
        }

        if let Err(e) = check_expected_state(step, self.data.last_reported_state) {
            error!(error = %e, "⚙️ WORKFLOW: Step called in unexpected state");
            return AducResult::failure(erc::UNEXPECTED_STATE);
        }

        if step == WorkflowStep::Download {
            if let Err(result) = self.prepare_sandbox() {
                return result;
            }
        }

        let handler = match self.load_handler() {
            Ok(handler) => handler,
            Err(result) => return result,
        };

        if let Some(started) = started_state_for(step) {
            self.set_update_state(started);
        }

        let Some(phase) = self.phase_context(step) else {
            return AducResult::failure(erc::NOT_PERMITTED);
        };
        self.cancellation.reset();
        self.active_handler = Some(Arc::clone(&handler));
        self.active_phase = Some(phase.clone());

        match step {
            WorkflowStep::Download => handler.download(&phase),
            WorkflowStep::Backup => handler.backup(&phase),
            WorkflowStep::Install => handler.install(&phase),
            WorkflowStep::Apply => handler.apply(&phase),
            WorkflowStep::Restore => handler.restore(&phase),
            WorkflowStep::ProcessDeployment | WorkflowStep::Undefined => {
                AducResult::failure(erc::NOT_PERMITTED)
            }
        }
    }

    /// Apply a finished step; returns `true` if the next step should run
    fn complete_step(&mut self, step: WorkflowStep, result: AducResult) -> bool {
        let Some(entry) = entry_for(step) else {
            error!(step = %step, "⚙️ WORKFLOW: Completion for unknown step");
            return false;
        };

        info!(
            step = %step,
            result_code = %result.result_code,
            erc = %result.extended_result_code,
            succeeded = result.is_success(),
            "⚙️ WORKFLOW: Step complete"
        );
        self.active_phase = None;

        if result.is_success() {
            self.on_step_succeeded(entry, result)
        } else if self.data.operation_cancelled {
            self.on_step_cancelled()
        } else {
            self.on_step_failed(entry, result)
        }
    }

    fn on_step_succeeded(&mut self, entry: &HandlerMapEntry, result: AducResult) -> bool {
        self.publisher.publish(
            events::WORKFLOW_STEP_COMPLETED,
            json!({ "workflow_id": self.data.workflow_id, "step": entry.step, "result": result }),
        );

        if matches!(
            entry.step,
            WorkflowStep::Install | WorkflowStep::Apply | WorkflowStep::Restore
        ) {
            self.handle_restart_request(result);
        }

        match entry.next_state_on_success {
            Some(state) => {
                info!(step = %entry.step, state = %state, "✅ WORKFLOW: Step succeeded");
                self.set_update_state_with_result(state, result);
            }
            None => {
                // Restore keeps the Failed report of the step that triggered it
                info!(
                    step = %entry.step,
                    "✅ WORKFLOW: Restore finished, deployment stays failed"
                );
                self.data.last_reported_state = UpdateState::Failed;
                self.data.clear_in_progress_and_cancel_requested();
                if let Some(handle) = self.data.handle.as_mut() {
                    handle.current_step = WorkflowStep::Undefined;
                }
                self.persist();
                return false;
            }
        }

        if self.data.handle.is_none() || self.data.last_reported_state == UpdateState::Idle {
            return false;
        }

        self.data.clear_in_progress_and_cancel_requested();

        if self.data.is_restart_in_progress() {
            info!(step = %entry.step, "🔄 WORKFLOW: Waiting for restart before continuing");
            return false;
        }
        if self.data.is_restart_pending() {
            // Apply completion turns the unstarted restart into a failure report
            warn!(step = %entry.step, "🔄 WORKFLOW: Restart could not be started, continuing");
        }

        self.auto_transition(entry.next_step_on_success)
    }

    fn on_step_failed(&mut self, entry: &HandlerMapEntry, result: AducResult) -> bool {
        warn!(
            step = %entry.step,
            state = %entry.next_state_on_failure,
            result_code = %result.result_code,
            erc = %result.extended_result_code,
            "❌ WORKFLOW: Step failed"
        );
        self.publisher.publish(
            events::WORKFLOW_STEP_FAILED,
            json!({ "workflow_id": self.data.workflow_id, "step": entry.step, "result": result }),
        );

        // Cleared so that a later retry or replacement starts instead of cancelling
        self.data.operation_in_progress = false;
        self.set_update_state_with_result(entry.next_state_on_failure, result);
        self.auto_transition(entry.next_step_on_failure)
    }

    fn on_step_cancelled(&mut self) -> bool {
        let cancellation_type = self
            .data
            .handle
            .as_ref()
            .map_or(CancellationType::None, |h| h.cancellation_type);
        warn!(cancellation_type = %cancellation_type, "🛑 WORKFLOW: Handling cancel completion");

        match cancellation_type {
            CancellationType::Replacement => {
                let replacement = self
                    .data
                    .handle
                    .as_mut()
                    .and_then(WorkflowHandle::take_replacement);
                let Some(replacement) = replacement else {
                    error!("🔀 WORKFLOW: Replacement requested without a pending deployment");
                    self.data.clear_in_progress_and_cancel_requested();
                    return false;
                };
                self.publisher.publish(
                    events::WORKFLOW_REPLACED,
                    json!({
                        "previous_workflow_id": self.data.workflow_id,
                        "deployment_id": replacement.deployment_id,
                    }),
                );
                self.data.clear_in_progress_and_cancel_requested();
                self.adopt_deployment(replacement);
                self.restart_at_process_deployment();
                true
            }
            CancellationType::Retry | CancellationType::ComponentChanged => {
                info!(
                    cancellation_type = %cancellation_type,
                    "🔁 WORKFLOW: Restarting deployment"
                );
                self.data.clear_in_progress_and_cancel_requested();
                self.restart_at_process_deployment();
                true
            }
            CancellationType::Normal => {
                warn!("🛑 WORKFLOW: Operation cancelled, returning to Idle");
                self.data.clear_in_progress_and_cancel_requested();
                self.set_update_state_with_result(UpdateState::Idle, AducResult::cancelled());
                false
            }
            CancellationType::None => {
                error!("🛑 WORKFLOW: Cancel completion without a cancellation type");
                self.data.clear_in_progress_and_cancel_requested();
                false
            }
        }
    }

    fn restart_at_process_deployment(&mut self) {
        if let Some(handle) = self.data.handle.as_mut() {
            handle.reset_for_retry();
            handle.current_step = WorkflowStep::ProcessDeployment;
            self.data.current_action = handle.action;
        }
        self.data.last_reported_state = UpdateState::Idle;
    }

    fn auto_transition(&mut self, next_step: WorkflowStep) -> bool {
        if is_workflow_complete(next_step) {
            info!("🏁 WORKFLOW: Workflow is complete");
            return false;
        }
        info!(next_step = %next_step, "➡️ WORKFLOW: Auto-transition");
        match self.data.handle.as_mut() {
            Some(handle) => {
                handle.current_step = next_step;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Reboot / restart
    // ------------------------------------------------------------------

    fn handle_restart_request(&mut self, result: AducResult) {
        let (reboot, restart) = match self.data.handle.as_mut() {
            Some(handle) => {
                handle.reboot_requested |= result.result_code.requires_reboot();
                handle.agent_restart_requested |= result.result_code.requires_agent_restart();
                (handle.reboot_requested, handle.agent_restart_requested)
            }
            None => return,
        };

        if reboot {
            info!("🔄 WORKFLOW: Reboot required, rebooting system now");
            self.data.system_reboot_state = RestartState::Required;
            self.publisher.publish(
                events::SYSTEM_REBOOT_REQUESTED,
                json!({ "workflow_id": self.data.workflow_id }),
            );
            match self.platform.reboot_system() {
                Ok(()) => self.data.system_reboot_state = RestartState::InProgress,
                Err(e) => {
                    error!(error = %e, "🔄 WORKFLOW: Reboot attempt failed");
                    self.data.operation_in_progress = false;
                }
            }
        } else if restart {
            info!("🔄 WORKFLOW: Agent restart required, restarting agent now");
            self.data.agent_restart_state = RestartState::Required;
            self.publisher.publish(
                events::AGENT_RESTART_REQUESTED,
                json!({ "workflow_id": self.data.workflow_id }),
            );
            match self.platform.restart_agent() {
                Ok(()) => self.data.agent_restart_state = RestartState::InProgress,
                Err(e) => {
                    error!(error = %e, "🔄 WORKFLOW: Agent restart attempt failed");
                    self.data.operation_in_progress = false;
                }
            }
        } else {
            self.data.operation_in_progress = false;
        }
        self.persist();
    }

    fn complete_after_restart(&mut self) {
        self.data.startup_idle_call_sent = true;

        if self.data.handle.is_none() {
            self.set_update_state_with_result(
                UpdateState::Idle,
                AducResult::success(ResultCode::SUCCESS),
            );
            return;
        }

        if self.is_installed() {
            self.set_installed_update_id_and_go_to_idle();
            return;
        }

        if self.data.current_step() == WorkflowStep::Install {
            // Install asked for the restart; apply has not run yet
            info!("🔄 WORKFLOW: Resuming deployment after install restart");
            self.data.last_reported_state = UpdateState::Idle;
            if let Some(handle) = self.data.handle.as_mut() {
                handle.reset_for_retry();
            }
            self.handle_update_action();
            return;
        }

        warn!("🔄 WORKFLOW: Update not installed after restart");
        self.report_idle_without_update_id(AducResult::failure(erc::NOT_RECOVERABLE));
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    fn set_update_state(&mut self, state: UpdateState) {
        self.set_update_state_with_result(state, AducResult::success(ResultCode::SUCCESS));
    }

    fn set_update_state_with_result(&mut self, state: UpdateState, result: AducResult) {
        info!(state = %state, "📤 WORKFLOW: Setting update state");

        if state == UpdateState::Idle {
            if self.data.last_reported_state == UpdateState::ApplyStarted {
                let reboot = self.data.system_reboot_state;
                let restart = self.data.agent_restart_state;

                if reboot == RestartState::None && restart == RestartState::None {
                    self.set_installed_update_id_and_go_to_idle();
                    return;
                }
                if reboot == RestartState::InProgress || restart == RestartState::InProgress {
                    // The installed update id is only accurate after the restart
                    info!("🔄 WORKFLOW: Restart in progress, withholding Idle report");
                    self.persist();
                    return;
                }

                warn!("🔄 WORKFLOW: Restart could not be initiated, update failed");
                let erc = if reboot.is_pending() {
                    erc::REBOOT_FAILED
                } else {
                    erc::AGENT_RESTART_FAILED
                };
                self.data.system_reboot_state = RestartState::None;
                self.data.agent_restart_state = RestartState::None;
                self.report_idle_without_update_id(AducResult::failure(erc));
                return;
            }

            self.report_idle_without_update_id(result);
            return;
        }

        let reported = if self.report(state, result, None) {
            state
        } else {
            UpdateState::Failed
        };
        self.data.last_reported_state = reported;
        self.persist();
    }

    fn report_idle_without_update_id(&mut self, result: AducResult) {
        if !self.report(UpdateState::Idle, result, None) {
            error!("📤 WORKFLOW: Failed to report Idle");
        }
        self.data.last_reported_state = UpdateState::Idle;
        self.go_idle();
    }

    /// Report a successful deployment and end the workflow
    fn set_installed_update_id_and_go_to_idle(&mut self) {
        let update_id = self
            .data
            .content()
            .map(|content| content.expected_update_id.to_json_string());

        if !self.report(
            UpdateState::Idle,
            AducResult::success(ResultCode::APPLY_SUCCESS),
            update_id.as_deref(),
        ) {
            error!("📤 WORKFLOW: Failed to report installed update id");
        }
        self.data.last_reported_state = UpdateState::Idle;
        self.data.last_completed_workflow_id = self.data.deployment_id().map(str::to_string);

        log_workflow_operation(
            "complete",
            self.data.workflow_id.as_deref(),
            self.data.last_completed_workflow_id.as_deref(),
            None,
            "installed",
            update_id.as_deref(),
        );
        self.publisher.publish(
            events::WORKFLOW_COMPLETED,
            json!({
                "workflow_id": self.data.workflow_id,
                "deployment_id": self.data.last_completed_workflow_id,
                "installed_update_id": update_id,
            }),
        );

        self.data.system_reboot_state = RestartState::None;
        self.data.agent_restart_state = RestartState::None;
        self.go_idle();
    }

    /// Forward a report to the cloud unless the state is internal-only
    fn report(
        &mut self,
        state: UpdateState,
        result: AducResult,
        installed_update_id: Option<&str>,
    ) -> bool {
        if should_not_report_to_cloud(state) {
            debug!(state = %state, "📤 WORKFLOW: State not reported to cloud");
            return true;
        }

        let report = StateReport {
            workflow_id: self.data.workflow_id.clone().unwrap_or_default(),
            deployment_id: self.data.deployment_id().unwrap_or_default().to_string(),
            state,
            result,
            installed_update_id: installed_update_id.map(str::to_string),
        };
        let accepted = self.reporter.report_state_and_result(&report);

        info!(
            state = %state,
            result_code = %result.result_code,
            erc = %result.extended_result_code,
            installed_update_id = ?installed_update_id,
            accepted = accepted,
            "📤 WORKFLOW: State reported"
        );
        self.publisher.publish(
            events::WORKFLOW_STATE_REPORTED,
            json!({
                "workflow_id": report.workflow_id,
                "state": state,
                "result": result,
                "installed_update_id": report.installed_update_id,
            }),
        );
        accepted
    }

    /// End the current workflow: remove its sandbox and forget the deployment
    fn go_idle(&mut self) {
        if let Some(workflow_id) = self.data.workflow_id.clone() {
            info!(workflow_id = %workflow_id, "🏁 WORKFLOW: Ending workflow");
            self.destroy_sandbox(&workflow_id);
        }
        self.data.clear_workflow();
        self.active_handler = None;
        self.active_phase = None;
        self.cancellation.reset();
        self.persist();
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn is_current_completion(&self, completion: &WorkCompletion) -> bool {
        self.data.operation_in_progress
            && self.data.workflow_id.as_deref() == Some(completion.workflow_id.as_str())
            && self.data.current_step() == completion.step
    }

    fn is_installed(&self) -> bool {
        let Some(content) = self.data.content().cloned() else {
            return false;
        };
        let handler = match self.registry.load_handler(&content.update_type) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(error = %e, "🔍 WORKFLOW: Cannot check installed state");
                return false;
            }
        };
        let result = handler.is_installed(&content);
        debug!(
            update_type = %content.update_type,
            result_code = %result.result_code,
            "🔍 WORKFLOW: IsInstalled"
        );
        result.result_code == ResultCode::IS_INSTALLED_INSTALLED
    }

    fn load_handler(&self) -> Result<SharedContentHandler, AducResult> {
        if let Some(handler) = self.active_handler.as_ref() {
            return Ok(Arc::clone(handler));
        }
        let update_type = self
            .data
            .content()
            .map(|content| content.update_type.clone())
            .ok_or_else(|| AducResult::failure(erc::NOT_PERMITTED))?;
        self.registry.load_handler(&update_type).map_err(|e| {
            error!(error = %e, "🧩 WORKFLOW: Content handler load failed");
            AducResult::failure(erc::HANDLER_LOAD_FAILED)
        })
    }

    fn phase_context(&self, step: WorkflowStep) -> Option<PhaseContext> {
        let workflow_id = self.data.workflow_id.clone()?;
        let handle = self.data.handle.as_ref()?;
        let content = handle.content.clone()?;
        Some(PhaseContext {
            completion: self.completions.sender_for(&workflow_id, step),
            workflow_id,
            deployment_id: handle.deployment_id.clone(),
            step,
            content,
            manifest: handle.manifest.clone(),
            work_folder: self.data.work_folder.clone().unwrap_or_default(),
            cancellation: self.cancellation.clone(),
        })
    }

    fn prepare_sandbox(&mut self) -> Result<(), AducResult> {
        let workflow_id = self
            .data
            .workflow_id
            .clone()
            .ok_or_else(|| AducResult::failure(erc::NOT_PERMITTED))?;
        match self.platform.create_sandbox(&workflow_id) {
            Ok(path) => {
                info!(work_folder = %path.display(), "📁 WORKFLOW: Using sandbox");
                self.data.work_folder = Some(path);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "📁 WORKFLOW: Sandbox creation failed");
                Err(AducResult::failure(erc::SANDBOX_CREATE_FAILED))
            }
        }
    }

    fn destroy_sandbox(&mut self, workflow_id: &str) {
        if let Err(e) = self.platform.destroy_sandbox(workflow_id) {
            warn!(workflow_id = %workflow_id, error = %e, "📁 WORKFLOW: Sandbox cleanup failed");
        }
    }

    /// Remove sandboxes of earlier workflows; the current one may hold
    /// payloads a retry can reuse
    fn cleanup_previous_sandboxes(&mut self) {
        let keep = self.data.workflow_id.clone();
        if let Err(e) = self.platform.cleanup_stale_sandboxes(keep.as_deref()) {
            warn!(error = %e, "📁 WORKFLOW: Stale sandbox cleanup failed");
        }
    }

    fn persist(&self) {
        if let Some(persistence) = self.persistence.as_ref() {
            if let Err(e) = persistence.save(&self.data.snapshot()) {
                warn!(error = %e, "💾 WORKFLOW: Failed to persist workflow state");
            }
        }
    }
}
