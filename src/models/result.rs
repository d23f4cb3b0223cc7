//! # Phase Results and Extended Result Codes
//!
//! Every content-handler phase and every workflow-level decision produces an
//! [`AducResult`]: a coarse [`ResultCode`] (success iff `> 0`) paired with a
//! facility-tagged [`ExtendedResultCode`].
//!
//! ## Extended result code layout
//!
//! ```text
//!  31    28 27                                 0
//! ┌────────┬────────────────────────────────────┐
//! │facility│        facility-specific code      │
//! └────────┴────────────────────────────────────┘
//! ```
//!
//! The facility nibble lets any subsystem mint a globally distinguishable
//! diagnostic code without coordinating a shared enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse phase outcome. Values above zero are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const FAILURE: Self = Self(0);
    pub const FAILURE_CANCELLED: Self = Self(-1);
    pub const SUCCESS: Self = Self(1);

    pub const DEPLOYMENT_IN_PROGRESS_SUCCESS: Self = Self(400);

    pub const DOWNLOAD_SUCCESS: Self = Self(500);
    pub const DOWNLOAD_IN_PROGRESS: Self = Self(501);

    pub const INSTALL_SUCCESS: Self = Self(600);
    pub const INSTALL_IN_PROGRESS: Self = Self(601);
    pub const INSTALL_SKIPPED_UPDATE_ALREADY_INSTALLED: Self = Self(603);
    pub const INSTALL_REQUIRED_IMMEDIATE_REBOOT: Self = Self(605);
    pub const INSTALL_REQUIRED_REBOOT: Self = Self(606);
    pub const INSTALL_REQUIRED_IMMEDIATE_AGENT_RESTART: Self = Self(607);
    pub const INSTALL_REQUIRED_AGENT_RESTART: Self = Self(608);

    pub const APPLY_SUCCESS: Self = Self(700);
    pub const APPLY_IN_PROGRESS: Self = Self(701);
    pub const APPLY_REQUIRED_IMMEDIATE_REBOOT: Self = Self(705);
    pub const APPLY_REQUIRED_REBOOT: Self = Self(706);
    pub const APPLY_REQUIRED_IMMEDIATE_AGENT_RESTART: Self = Self(707);
    pub const APPLY_REQUIRED_AGENT_RESTART: Self = Self(708);

    pub const CANCEL_SUCCESS: Self = Self(800);
    pub const CANCEL_UNABLE_TO_CANCEL: Self = Self(801);

    pub const IS_INSTALLED_INSTALLED: Self = Self(900);
    pub const IS_INSTALLED_NOT_INSTALLED: Self = Self(901);

    pub const BACKUP_SUCCESS: Self = Self(1000);
    pub const BACKUP_SUCCESS_UNSUPPORTED: Self = Self(1001);
    pub const BACKUP_IN_PROGRESS: Self = Self(1002);

    pub const RESTORE_SUCCESS: Self = Self(1100);
    pub const RESTORE_SUCCESS_UNSUPPORTED: Self = Self(1101);
    pub const RESTORE_IN_PROGRESS: Self = Self(1102);
    pub const RESTORE_REQUIRED_IMMEDIATE_REBOOT: Self = Self(1105);
    pub const RESTORE_REQUIRED_REBOOT: Self = Self(1106);
    pub const RESTORE_REQUIRED_IMMEDIATE_AGENT_RESTART: Self = Self(1107);
    pub const RESTORE_REQUIRED_AGENT_RESTART: Self = Self(1108);

    /// Success test shared by every phase
    pub fn is_success(self) -> bool {
        self.0 > 0
    }

    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Handler accepted the phase but will finish it asynchronously
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::DOWNLOAD_IN_PROGRESS
                | Self::INSTALL_IN_PROGRESS
                | Self::APPLY_IN_PROGRESS
                | Self::BACKUP_IN_PROGRESS
                | Self::RESTORE_IN_PROGRESS
        )
    }

    pub fn requires_reboot(self) -> bool {
        matches!(
            self,
            Self::INSTALL_REQUIRED_IMMEDIATE_REBOOT
                | Self::INSTALL_REQUIRED_REBOOT
                | Self::APPLY_REQUIRED_IMMEDIATE_REBOOT
                | Self::APPLY_REQUIRED_REBOOT
                | Self::RESTORE_REQUIRED_IMMEDIATE_REBOOT
                | Self::RESTORE_REQUIRED_REBOOT
        )
    }

    pub fn requires_agent_restart(self) -> bool {
        matches!(
            self,
            Self::INSTALL_REQUIRED_IMMEDIATE_AGENT_RESTART
                | Self::INSTALL_REQUIRED_AGENT_RESTART
                | Self::APPLY_REQUIRED_IMMEDIATE_AGENT_RESTART
                | Self::APPLY_REQUIRED_AGENT_RESTART
                | Self::RESTORE_REQUIRED_IMMEDIATE_AGENT_RESTART
                | Self::RESTORE_REQUIRED_AGENT_RESTART
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subsystem tag stored in the top nibble of an [`ExtendedResultCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    Unknown,
    ContentHandler,
    AgentCore,
    AptHandler,
    Crypto,
    DeliveryOptimization,
    Errno,
    LowerLayer,
}

impl Facility {
    pub fn nibble(self) -> u32 {
        match self {
            Self::Unknown => 0x0,
            Self::ContentHandler => 0x1,
            Self::AgentCore => 0x3,
            Self::AptHandler => 0xA,
            Self::Crypto => 0xC,
            Self::DeliveryOptimization => 0xD,
            Self::Errno => 0xE,
            Self::LowerLayer => 0xF,
        }
    }

    pub fn from_nibble(nibble: u32) -> Self {
        match nibble & 0xF {
            0x1 => Self::ContentHandler,
            0x3 => Self::AgentCore,
            0xA => Self::AptHandler,
            0xC => Self::Crypto,
            0xD => Self::DeliveryOptimization,
            0xE => Self::Errno,
            0xF => Self::LowerLayer,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::ContentHandler => write!(f, "content_handler"),
            Self::AgentCore => write!(f, "agent_core"),
            Self::AptHandler => write!(f, "apt_handler"),
            Self::Crypto => write!(f, "crypto"),
            Self::DeliveryOptimization => write!(f, "delivery_optimization"),
            Self::Errno => write!(f, "errno"),
            Self::LowerLayer => write!(f, "lower_layer"),
        }
    }
}

/// Facility-tagged diagnostic code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtendedResultCode(pub u32);

const ERC_VALUE_MASK: u32 = 0x0FFF_FFFF;

impl ExtendedResultCode {
    pub const NONE: Self = Self(0);

    pub const fn make(facility_nibble: u32, value: u32) -> Self {
        Self(((facility_nibble & 0xF) << 28) | (value & ERC_VALUE_MASK))
    }

    pub fn new(facility: Facility, value: u32) -> Self {
        Self::make(facility.nibble(), value)
    }

    pub const fn errno(errno: u32) -> Self {
        Self::make(0xE, errno)
    }

    pub fn facility(self) -> Facility {
        Facility::from_nibble(self.0 >> 28)
    }

    pub fn value(self) -> u32 {
        self.0 & ERC_VALUE_MASK
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ExtendedResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Well-known extended result codes
pub mod erc {
    use super::ExtendedResultCode;

    pub const NOT_PERMITTED: ExtendedResultCode = ExtendedResultCode::errno(1);
    pub const NO_MEMORY: ExtendedResultCode = ExtendedResultCode::errno(12);
    pub const NOT_RECOVERABLE: ExtendedResultCode = ExtendedResultCode::errno(131);

    // Workflow-level codes raised by the agent itself.
    pub const UNEXPECTED_STATE: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x001);
    pub const HANDLER_LOAD_FAILED: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x002);
    pub const SANDBOX_CREATE_FAILED: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x003);
    pub const REBOOT_FAILED: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x004);
    pub const AGENT_RESTART_FAILED: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x005);
    pub const OPERATION_CANCELLED: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x006);
    pub const INVALID_UPDATE_ACTION: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x007);
    pub const REPORT_FAILED: ExtendedResultCode = ExtendedResultCode::make(0x3, 0x008);
}

/// `{ResultCode, ExtendedResultCode}` pair returned by every phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AducResult {
    pub result_code: ResultCode,
    pub extended_result_code: ExtendedResultCode,
}

impl AducResult {
    pub fn new(result_code: ResultCode, extended_result_code: ExtendedResultCode) -> Self {
        Self {
            result_code,
            extended_result_code,
        }
    }

    pub fn success(result_code: ResultCode) -> Self {
        Self::new(result_code, ExtendedResultCode::NONE)
    }

    pub fn failure(extended_result_code: ExtendedResultCode) -> Self {
        Self::new(ResultCode::FAILURE, extended_result_code)
    }

    pub fn cancelled() -> Self {
        Self::new(ResultCode::FAILURE_CANCELLED, erc::OPERATION_CANCELLED)
    }

    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }

    pub fn is_failure(&self) -> bool {
        self.result_code.is_failure()
    }

    pub fn is_in_progress(&self) -> bool {
        self.result_code.is_in_progress()
    }
}

impl Default for AducResult {
    fn default() -> Self {
        Self::failure(ExtendedResultCode::NONE)
    }
}

impl fmt::Display for AducResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rc={} erc={}", self.result_code, self.extended_result_code)
    }
}
