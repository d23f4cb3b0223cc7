use crate::events::{StateReport, StateReporter};
use crate::state_machine::states::UpdateState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reporter that records every report it is handed
#[derive(Debug, Clone)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<StateReport>>>,
    accepting: Arc<AtomicBool>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self {
            reports: Arc::new(Mutex::new(Vec::new())),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Make subsequent reports fail (they are still recorded)
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<StateReport> {
        self.reports.lock().clone()
    }

    pub fn states(&self) -> Vec<UpdateState> {
        self.reports.lock().iter().map(|r| r.state).collect()
    }

    pub fn last(&self) -> Option<StateReport> {
        self.reports.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl Default for RecordingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StateReporter for RecordingReporter {
    fn report_state_and_result(&mut self, report: &StateReport) -> bool {
        self.reports.lock().push(report.clone());
        self.accepting.load(Ordering::SeqCst)
    }
}
