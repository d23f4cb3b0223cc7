use crate::models::{AducResult, ContentData, ResultCode};
use crate::registry::{ContentHandler, PhaseContext};
use crate::state_machine::states::WorkflowStep;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct ScriptState {
    scripted: HashMap<WorkflowStep, VecDeque<AducResult>>,
    installed: bool,
    calls: Vec<WorkflowStep>,
    cancel_calls: u32,
    is_installed_calls: u32,
    /// Phase that returned an in-progress result and has not completed yet
    pending: Option<PhaseContext>,
}

/// Content handler that plays back scripted phase results
///
/// Unscripted phases succeed. A scripted in-progress result parks the
/// phase until [`ScriptedContentHandler::complete_pending`] is called;
/// `cancel` completes a parked phase with [`AducResult::cancelled`].
/// A successful apply marks the update installed.
#[derive(Debug)]
pub struct ScriptedContentHandler {
    update_type: String,
    state: Mutex<ScriptState>,
}

impl ScriptedContentHandler {
    pub fn new<S: Into<String>>(update_type: S) -> Self {
        Self {
            update_type: update_type.into(),
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Queue `result` for the next invocation of `step`
    pub fn with_result(self, step: WorkflowStep, result: AducResult) -> Self {
        self.script(step, result);
        self
    }

    pub fn script(&self, step: WorkflowStep, result: AducResult) {
        self.state
            .lock()
            .scripted
            .entry(step)
            .or_default()
            .push_back(result);
    }

    pub fn set_installed(&self, installed: bool) {
        self.state.lock().installed = installed;
    }

    pub fn calls(&self) -> Vec<WorkflowStep> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, step: WorkflowStep) -> usize {
        self.state.lock().calls.iter().filter(|s| **s == step).count()
    }

    pub fn cancel_count(&self) -> u32 {
        self.state.lock().cancel_calls
    }

    pub fn is_installed_count(&self) -> u32 {
        self.state.lock().is_installed_calls
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Finish the parked phase; `false` if none was parked
    pub fn complete_pending(&self, result: AducResult) -> bool {
        let pending = self.state.lock().pending.take();
        match pending {
            Some(ctx) => {
                if ctx.step == WorkflowStep::Apply && result.is_success() {
                    self.set_installed(true);
                }
                ctx.completion.complete(result)
            }
            None => false,
        }
    }

    fn run(&self, step: WorkflowStep, ctx: &PhaseContext, default: ResultCode) -> AducResult {
        let mut state = self.state.lock();
        state.calls.push(step);
        let result = state
            .scripted
            .get_mut(&step)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| AducResult::success(default));
        if result.is_in_progress() {
            state.pending = Some(ctx.clone());
        } else if step == WorkflowStep::Apply && result.is_success() {
            state.installed = true;
        }
        result
    }
}

impl ContentHandler for ScriptedContentHandler {
    fn update_type(&self) -> &str {
        &self.update_type
    }

    fn download(&self, ctx: &PhaseContext) -> AducResult {
        self.run(WorkflowStep::Download, ctx, ResultCode::DOWNLOAD_SUCCESS)
    }

    fn install(&self, ctx: &PhaseContext) -> AducResult {
        self.run(WorkflowStep::Install, ctx, ResultCode::INSTALL_SUCCESS)
    }

    fn apply(&self, ctx: &PhaseContext) -> AducResult {
        self.run(WorkflowStep::Apply, ctx, ResultCode::APPLY_SUCCESS)
    }

    fn backup(&self, ctx: &PhaseContext) -> AducResult {
        self.run(WorkflowStep::Backup, ctx, ResultCode::BACKUP_SUCCESS)
    }

    fn restore(&self, ctx: &PhaseContext) -> AducResult {
        self.run(WorkflowStep::Restore, ctx, ResultCode::RESTORE_SUCCESS)
    }

    fn cancel(&self, _ctx: &PhaseContext) -> AducResult {
        let pending = {
            let mut state = self.state.lock();
            state.cancel_calls += 1;
            state.pending.take()
        };
        if let Some(parked) = pending {
            parked.cancellation.cancel();
            parked.completion.complete(AducResult::cancelled());
        }
        AducResult::success(ResultCode::CANCEL_SUCCESS)
    }

    fn is_installed(&self, _content: &ContentData) -> AducResult {
        let mut state = self.state.lock();
        state.is_installed_calls += 1;
        if state.installed {
            AducResult::success(ResultCode::IS_INSTALLED_INSTALLED)
        } else {
            AducResult::success(ResultCode::IS_INSTALLED_NOT_INSTALLED)
        }
    }
}
