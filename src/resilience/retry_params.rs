//! Failure classification and per-class retry parameters.

use crate::constants::retry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a failed attempt, decided by the operation itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    #[default]
    None,
    ClientTransient,
    ClientUnrecoverable,
    ServerTransient,
    ServerUnrecoverable,
}

impl FailureClass {
    /// Unrecoverable classes never retry, whatever `max_retries` says
    pub fn is_unrecoverable(self) -> bool {
        matches!(self, Self::ClientUnrecoverable | Self::ServerUnrecoverable)
    }

    pub fn is_transient(self) -> bool {
        matches!(self, Self::ClientTransient | Self::ServerTransient)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ClientTransient => write!(f, "client_transient"),
            Self::ClientUnrecoverable => write!(f, "client_unrecoverable"),
            Self::ServerTransient => write!(f, "server_transient"),
            Self::ServerUnrecoverable => write!(f, "server_unrecoverable"),
        }
    }
}

/// Backoff tuning for one failure class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryParams {
    /// Attempts allowed before the operation gives up
    pub max_retries: u32,
    /// Cap on the exponential backoff term
    pub max_delay_secs: i64,
    /// Wait used when the backoff inputs are invalid
    pub fallback_wait_time_secs: i64,
    /// Backoff unit; the delay for attempt `n` is `unit * 2^n`
    pub initial_delay_unit_ms: i64,
    /// Upper bound of the uniform jitter, 0..=100
    pub max_jitter_percent: f64,
}

impl RetryParams {
    /// Parameters that refuse any retry
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            max_delay_secs: retry::DEFAULT_MAX_BACKOFF_SECS,
            fallback_wait_time_secs: retry::FALLBACK_WAIT_TIME_SECS,
            initial_delay_unit_ms: retry::DEFAULT_INITIAL_DELAY_MS,
            max_jitter_percent: retry::DEFAULT_MAX_JITTER_PERCENT,
        }
    }
}

/// Retry parameters indexed by [`FailureClass`]
///
/// `default` governs attempts that failed without a class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryParamsTable {
    pub default: RetryParams,
    pub client_transient: RetryParams,
    pub client_unrecoverable: RetryParams,
    pub server_transient: RetryParams,
    pub server_unrecoverable: RetryParams,
}

impl RetryParamsTable {
    /// Same parameters for every class
    pub fn uniform(params: RetryParams) -> Self {
        Self {
            default: params,
            client_transient: params,
            client_unrecoverable: params,
            server_transient: params,
            server_unrecoverable: params,
        }
    }

    pub fn get(&self, class: FailureClass) -> &RetryParams {
        match class {
            FailureClass::None => &self.default,
            FailureClass::ClientTransient => &self.client_transient,
            FailureClass::ClientUnrecoverable => &self.client_unrecoverable,
            FailureClass::ServerTransient => &self.server_transient,
            FailureClass::ServerUnrecoverable => &self.server_unrecoverable,
        }
    }

    pub fn set(&mut self, class: FailureClass, params: RetryParams) {
        match class {
            FailureClass::None => self.default = params,
            FailureClass::ClientTransient => self.client_transient = params,
            FailureClass::ClientUnrecoverable => self.client_unrecoverable = params,
            FailureClass::ServerTransient => self.server_transient = params,
            FailureClass::ServerUnrecoverable => self.server_unrecoverable = params,
        }
    }
}

impl Default for RetryParamsTable {
    fn default() -> Self {
        Self {
            default: RetryParams::default(),
            client_transient: RetryParams::default(),
            client_unrecoverable: RetryParams::no_retry(),
            server_transient: RetryParams::default(),
            server_unrecoverable: RetryParams::no_retry(),
        }
    }
}
