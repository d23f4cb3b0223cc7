use crate::models::AducResult;
use crate::state_machine::states::UpdateState;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One state/result transition sent to the management plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReport {
    pub workflow_id: String,
    /// Cloud deployment id; empty when no deployment is active
    pub deployment_id: String,
    pub state: UpdateState,
    pub result: AducResult,
    /// Serialized update id, only on a successful terminal Idle
    pub installed_update_id: Option<String>,
}

/// Outbound reporting boundary (`ReportStateAndResultAsync`)
///
/// Implementations enqueue the report for the transport and return at once;
/// `false` means the report could not be queued.
pub trait StateReporter: Send + Debug {
    fn report_state_and_result(&mut self, report: &StateReport) -> bool;
}
