use serde::{Deserialize, Serialize};
use std::fmt;

/// Agent state as seen by the cloud management plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// Workflow data is not initialized
    None,
    /// Start state and the state that reports deployment success
    Idle,
    DownloadStarted,
    DownloadSucceeded,
    BackupStarted,
    BackupSucceeded,
    InstallStarted,
    InstallSucceeded,
    ApplyStarted,
    RestoreStarted,
    /// Acknowledgement of a ProcessDeployment action
    DeploymentInProgress,
    /// Deployment failed
    Failed,
}

impl UpdateState {
    /// Every enumerated state, in wire-value order
    pub const ALL: [UpdateState; 12] = [
        Self::None,
        Self::Idle,
        Self::DownloadStarted,
        Self::DownloadSucceeded,
        Self::InstallStarted,
        Self::InstallSucceeded,
        Self::ApplyStarted,
        Self::DeploymentInProgress,
        Self::BackupStarted,
        Self::BackupSucceeded,
        Self::RestoreStarted,
        Self::Failed,
    ];

    /// Numeric value used on the wire
    pub fn code(self) -> i32 {
        match self {
            Self::None => -1,
            Self::Idle => 0,
            Self::DownloadStarted => 1,
            Self::DownloadSucceeded => 2,
            Self::InstallStarted => 3,
            Self::InstallSucceeded => 4,
            Self::ApplyStarted => 5,
            Self::DeploymentInProgress => 6,
            Self::BackupStarted => 7,
            Self::BackupSucceeded => 8,
            Self::RestoreStarted => 9,
            Self::Failed => 255,
        }
    }

    /// Check if this is a terminal state for a deployment
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }

    /// Check if a phase is running in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::DownloadStarted
                | Self::BackupStarted
                | Self::InstallStarted
                | Self::ApplyStarted
                | Self::RestoreStarted
        )
    }
}

impl Default for UpdateState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Idle => write!(f, "idle"),
            Self::DownloadStarted => write!(f, "download_started"),
            Self::DownloadSucceeded => write!(f, "download_succeeded"),
            Self::BackupStarted => write!(f, "backup_started"),
            Self::BackupSucceeded => write!(f, "backup_succeeded"),
            Self::InstallStarted => write!(f, "install_started"),
            Self::InstallSucceeded => write!(f, "install_succeeded"),
            Self::ApplyStarted => write!(f, "apply_started"),
            Self::RestoreStarted => write!(f, "restore_started"),
            Self::DeploymentInProgress => write!(f, "deployment_in_progress"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for UpdateState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "idle" => Ok(Self::Idle),
            "download_started" => Ok(Self::DownloadStarted),
            "download_succeeded" => Ok(Self::DownloadSucceeded),
            "backup_started" => Ok(Self::BackupStarted),
            "backup_succeeded" => Ok(Self::BackupSucceeded),
            "install_started" => Ok(Self::InstallStarted),
            "install_succeeded" => Ok(Self::InstallSucceeded),
            "apply_started" => Ok(Self::ApplyStarted),
            "restore_started" => Ok(Self::RestoreStarted),
            "deployment_in_progress" => Ok(Self::DeploymentInProgress),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid update state: {s}")),
        }
    }
}

/// Action requested by the cloud in a property update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    /// No action is being processed
    Undefined,
    /// Process a deployment with agent-driven orchestration
    ProcessDeployment,
    /// Cancel the ongoing deployment
    Cancel,
}

impl UpdateAction {
    /// Map the numeric action carried by the update payload
    pub fn from_code(code: i64) -> Self {
        match code {
            3 => Self::ProcessDeployment,
            255 => Self::Cancel,
            _ => Self::Undefined,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Undefined => -1,
            Self::ProcessDeployment => 3,
            Self::Cancel => 255,
        }
    }
}

impl Default for UpdateAction {
    fn default() -> Self {
        Self::Undefined
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::ProcessDeployment => write!(f, "process_deployment"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Step of a deployment workflow; each maps to one handler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Undefined,
    ProcessDeployment,
    Download,
    Install,
    Apply,
    Backup,
    Restore,
}

impl Default for WorkflowStep {
    fn default() -> Self {
        Self::Undefined
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::ProcessDeployment => write!(f, "process_deployment"),
            Self::Download => write!(f, "download"),
            Self::Install => write!(f, "install"),
            Self::Apply => write!(f, "apply"),
            Self::Backup => write!(f, "backup"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// Why the in-flight operation is being cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationType {
    None,
    /// Cloud asked to cancel the deployment
    Normal,
    /// A different deployment superseded the current one
    Replacement,
    /// Same deployment redelivered with a new retry token
    Retry,
    /// Component inventory changed underneath the deployment
    ComponentChanged,
}

impl Default for CancellationType {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for CancellationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Normal => write!(f, "normal"),
            Self::Replacement => write!(f, "replacement"),
            Self::Retry => write!(f, "retry"),
            Self::ComponentChanged => write!(f, "component_changed"),
        }
    }
}

/// Tri-state tracking a system reboot or an agent restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartState {
    None,
    Required,
    InProgress,
}

impl RestartState {
    pub fn is_pending(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Default for RestartState {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for RestartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Required => write!(f, "required"),
            Self::InProgress => write!(f, "in_progress"),
        }
    }
}
