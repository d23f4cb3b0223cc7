//! # System Constants
//!
//! Retry defaults, identifier formats and lifecycle event names shared across
//! the update agent core.

/// Retry and backoff defaults
pub mod retry {
    /// Backoff unit used when none is configured
    pub const DEFAULT_INITIAL_DELAY_MS: i64 = 1000;
    pub const DEFAULT_MAX_BACKOFF_SECS: i64 = 60;
    pub const DEFAULT_MAX_JITTER_PERCENT: f64 = 5.0;
    /// Exponent cap; `2^9` units is the largest un-clamped backoff
    pub const MAX_RETRY_EXPONENT: u32 = 9;
    /// Wait used whenever the backoff inputs are invalid
    pub const FALLBACK_WAIT_TIME_SECS: i64 = 30;
    pub const DEFAULT_MAX_RETRIES: u32 = i32::MAX as u32;
}

/// Workflow identifiers and folders
pub mod workflow {
    /// `chrono` format of the timestamp part of a workflow id
    pub const WORKFLOW_ID_TIMESTAMP_FORMAT: &str = "%y%m%d%H%M%S";
    pub const DEFAULT_DOWNLOADS_FOLDER: &str = "/var/lib/update-agent/downloads";
    pub const DEFAULT_STATE_FILE: &str = "/var/lib/update-agent/workflow-state.json";
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
}

/// Retriable operation defaults
pub mod operations {
    pub const ENROLLMENT_INTERVAL_SECS: i64 = 60 * 60;
    pub const ENROLLMENT_EXPIRATION_SECS: i64 = 60 * 60 * 24;
    pub const ROOT_KEY_REFRESH_INTERVAL_SECS: i64 = 60 * 60 * 24;
    pub const TOPIC_SUBSCRIBE_INTERVAL_SECS: i64 = 60;
    /// Time to wait for a response to a published request
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 180;
}

/// Lifecycle events published for local observers
pub mod events {
    pub const WORKFLOW_ACCEPTED: &str = "workflow.accepted";
    pub const WORKFLOW_STEP_STARTED: &str = "workflow.step_started";
    pub const WORKFLOW_STEP_COMPLETED: &str = "workflow.step_completed";
    pub const WORKFLOW_STEP_FAILED: &str = "workflow.step_failed";
    pub const WORKFLOW_CANCEL_REQUESTED: &str = "workflow.cancel_requested";
    pub const WORKFLOW_REPLACED: &str = "workflow.replaced";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_STATE_REPORTED: &str = "workflow.state_reported";
    pub const SYSTEM_REBOOT_REQUESTED: &str = "system.reboot_requested";
    pub const AGENT_RESTART_REQUESTED: &str = "agent.restart_requested";

    pub const OPERATION_RETRY_SCHEDULED: &str = "operation.retry_scheduled";
    pub const OPERATION_SUCCEEDED: &str = "operation.succeeded";
    pub const OPERATION_FAILED: &str = "operation.failed";
    pub const OPERATION_EXPIRED: &str = "operation.expired";
}
