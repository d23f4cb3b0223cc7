//! # Workflow Handle
//!
//! Parsed form of a cloud property update plus the per-deployment runtime
//! bookkeeping the state machine keeps alongside it.
//!
//! ## Payload
//!
//! ```json
//! {
//!   "workflow": { "action": 3, "id": "d1", "retryTimestamp": "2024-01-01T00:00:00Z" },
//!   "updateManifest": "{\"updateId\":{...},\"updateType\":\"microsoft/apt:1\",...}",
//!   "forceUpdate": false
//! }
//! ```
//!
//! `updateManifest` may be an object or a string holding JSON. The handler
//! selector is `updateType`, or the `handler` of the first instruction step.

use crate::models::content_data::{ContentData, UpdateId};
use crate::state_machine::errors::WorkflowError;
use crate::state_machine::states::{CancellationType, UpdateAction, WorkflowStep};
use crate::utils::serde::{deserialize_embedded_json, deserialize_optional_numeric};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyUpdate {
    workflow: WorkflowSection,
    #[serde(default, deserialize_with = "deserialize_embedded_json")]
    update_manifest: Option<Value>,
    #[serde(default)]
    force_update: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowSection {
    #[serde(default, deserialize_with = "deserialize_optional_numeric")]
    action: Option<i64>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    retry_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFields {
    update_id: Option<UpdateId>,
    #[serde(default)]
    update_type: Option<String>,
    #[serde(default)]
    installed_criteria: Option<String>,
    #[serde(default)]
    instructions: Option<Instructions>,
}

#[derive(Debug, Deserialize)]
struct Instructions {
    #[serde(default)]
    steps: Vec<InstructionStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstructionStep {
    #[serde(default)]
    handler: Option<String>,
    #[serde(default)]
    handler_properties: Option<Value>,
}

/// One deployment as the state machine tracks it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    /// Cloud-assigned deployment id
    pub deployment_id: String,
    pub action: UpdateAction,
    /// Opaque token distinguishing a retry from a redelivery
    pub retry_token: Option<String>,
    pub force_update: bool,
    pub content: Option<ContentData>,
    /// Full manifest for content handlers
    pub manifest: Value,

    pub current_step: WorkflowStep,
    pub cancellation_type: CancellationType,
    pub reboot_requested: bool,
    pub agent_restart_requested: bool,
    /// Deployment waiting for the in-flight operation to be cancelled
    pub pending_replacement: Option<Box<WorkflowHandle>>,
}

impl WorkflowHandle {
    /// Parse a property-update payload
    pub fn from_property_update(payload: &str) -> Result<Self, WorkflowError> {
        let update: PropertyUpdate = serde_json::from_str(payload)
            .map_err(|e| WorkflowError::invalid_payload(e.to_string()))?;

        let action = update
            .workflow
            .action
            .map(UpdateAction::from_code)
            .ok_or_else(|| WorkflowError::missing_field("workflow.action"))?;
        if action == UpdateAction::Undefined {
            return Err(WorkflowError::invalid_payload(format!(
                "unsupported update action {:?}",
                update.workflow.action
            )));
        }

        let deployment_id = update
            .workflow
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| WorkflowError::missing_field("workflow.id"))?;

        let manifest = update.update_manifest.unwrap_or(Value::Null);
        let content = match action {
            UpdateAction::ProcessDeployment => Some(Self::content_from_manifest(&manifest)?),
            _ => None,
        };

        Ok(Self {
            deployment_id,
            action,
            retry_token: update.workflow.retry_timestamp,
            force_update: update.force_update,
            content,
            manifest,
            current_step: WorkflowStep::Undefined,
            cancellation_type: CancellationType::None,
            reboot_requested: false,
            agent_restart_requested: false,
            pending_replacement: None,
        })
    }

    fn content_from_manifest(manifest: &Value) -> Result<ContentData, WorkflowError> {
        if manifest.is_null() {
            return Err(WorkflowError::missing_field("updateManifest"));
        }

        let fields: ManifestFields = serde_json::from_value(manifest.clone())
            .map_err(|e| WorkflowError::invalid_payload(format!("updateManifest: {e}")))?;

        let expected_update_id = fields
            .update_id
            .filter(UpdateId::is_valid)
            .ok_or_else(|| WorkflowError::missing_field("updateManifest.updateId"))?;

        let first_step = fields
            .instructions
            .as_ref()
            .and_then(|instructions| instructions.steps.first());

        let update_type = fields
            .update_type
            .or_else(|| first_step.and_then(|step| step.handler.clone()))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| WorkflowError::missing_field("updateManifest.updateType"))?;

        let installed_criteria = fields.installed_criteria.or_else(|| {
            first_step
                .and_then(|step| step.handler_properties.as_ref())
                .and_then(|props| props.get("installedCriteria"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Ok(ContentData {
            expected_update_id,
            installed_criteria,
            update_type,
        })
    }

    pub fn is_same_deployment(&self, other: &WorkflowHandle) -> bool {
        self.deployment_id == other.deployment_id
    }

    pub fn retry_token(&self) -> Option<&str> {
        self.retry_token.as_deref()
    }

    /// Mark the deployment for retry with a new token
    pub fn update_retry_deployment(&mut self, new_token: Option<String>) {
        self.cancellation_type = CancellationType::Retry;
        self.retry_token = new_token;
    }

    /// Defer `replacement` until the in-flight operation stops
    pub fn defer_replacement(&mut self, replacement: WorkflowHandle) {
        self.cancellation_type = CancellationType::Replacement;
        self.pending_replacement = Some(Box::new(replacement));
    }

    /// Take the deferred deployment, if any
    pub fn take_replacement(&mut self) -> Option<WorkflowHandle> {
        self.pending_replacement.take().map(|boxed| *boxed)
    }

    /// Reset the runtime bookkeeping so the deployment starts over
    pub fn reset_for_retry(&mut self) {
        self.current_step = WorkflowStep::Undefined;
        self.cancellation_type = CancellationType::None;
        self.reboot_requested = false;
        self.agent_restart_requested = false;
    }
}
