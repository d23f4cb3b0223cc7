//! # Content Handler Contract
//!
//! A content handler performs the type-specific part of a deployment
//! (package manager, image flasher, script runner). The workflow engine
//! invokes one phase at a time and interprets the returned [`AducResult`]:
//! `result_code > 0` is success, an in-progress code means the phase will
//! finish later through [`PhaseContext::completion`].
//!
//! Handlers must observe [`PhaseContext::cancellation`] at safe points and
//! return [`AducResult::cancelled`]; the engine never interrupts a phase.

use crate::execution::{CancellationFlag, WorkCompletionSender};
use crate::models::{AducResult, ContentData, ResultCode};
use crate::state_machine::states::WorkflowStep;
use serde_json::Value;
use std::fmt::Debug;
use std::path::PathBuf;

/// Owned inputs of a single phase invocation
///
/// Everything is copied out of the workflow data so the handler can move the
/// context to another thread without borrowing engine state.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub workflow_id: String,
    pub deployment_id: String,
    pub step: WorkflowStep,
    pub content: ContentData,
    pub manifest: Value,
    /// Per-workflow sandbox directory
    pub work_folder: PathBuf,
    pub cancellation: CancellationFlag,
    pub completion: WorkCompletionSender,
}

impl PhaseContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Phase contract implemented per update type
pub trait ContentHandler: Send + Sync + Debug {
    /// Update type this handler serves, e.g. `microsoft/apt:1`
    fn update_type(&self) -> &str;

    fn download(&self, ctx: &PhaseContext) -> AducResult;

    fn install(&self, ctx: &PhaseContext) -> AducResult;

    fn apply(&self, ctx: &PhaseContext) -> AducResult;

    /// Ask the in-flight phase to stop
    fn cancel(&self, ctx: &PhaseContext) -> AducResult;

    fn is_installed(&self, content: &ContentData) -> AducResult;

    fn backup(&self, _ctx: &PhaseContext) -> AducResult {
        AducResult::success(ResultCode::BACKUP_SUCCESS_UNSUPPORTED)
    }

    fn restore(&self, _ctx: &PhaseContext) -> AducResult {
        AducResult::success(ResultCode::RESTORE_SUCCESS_UNSUPPORTED)
    }
}
