//! # Transport Failure Classification
//!
//! Maps errors reported by the cloud communication channel onto the
//! [`FailureClass`] that selects retry behavior for a retriable operation.
//!
//! ## Overview
//!
//! Classification belongs to the operation, not to the retry framework: an
//! operation receives a [`TransportError`] from its channel, asks a
//! [`FailureClassifier`] what kind of failure it is, and returns the class in
//! its attempt outcome.
//!
//! | Error                                   | Class                 |
//! |-----------------------------------------|-----------------------|
//! | no connection                           | client transient      |
//! | invalid request, oversize, protocol ... | client unrecoverable  |
//! | server busy, response timeout           | server transient      |
//! | malformed or rejected response          | server unrecoverable  |
//! | anything else                           | none (default params) |

use crate::resilience::FailureClass;
use thiserror::Error;

/// Error raised by the narrow transport interfaces operations depend on
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("No connection to the cloud endpoint")]
    NoConnection,

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Out of memory while building the request")]
    NoMemory,

    #[error("Protocol violation: {reason}")]
    Protocol { reason: String },

    #[error("Payload of {size} bytes exceeds the allowed size")]
    PayloadTooLarge { size: usize },

    #[error("Requested quality of service is not supported")]
    QosNotSupported,

    #[error("Server busy: {reason}")]
    ServerBusy { reason: String },

    #[error("No response within {timeout_secs}s")]
    ResponseTimeout { timeout_secs: i64 },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Request rejected by server: {reason}")]
    Rejected { reason: String },

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn invalid_request<S: Into<String>>(reason: S) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn malformed_response<S: Into<String>>(reason: S) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn server_busy<S: Into<String>>(reason: S) -> Self {
        Self::ServerBusy {
            reason: reason.into(),
        }
    }
}

/// Strategy deciding the failure class of a transport error
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &TransportError) -> FailureClass;
}

/// Default classification table
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFailureClassifier;

impl StandardFailureClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl FailureClassifier for StandardFailureClassifier {
    fn classify(&self, error: &TransportError) -> FailureClass {
        match error {
            TransportError::NoConnection => FailureClass::ClientTransient,
            TransportError::InvalidRequest { .. }
            | TransportError::NoMemory
            | TransportError::Protocol { .. }
            | TransportError::PayloadTooLarge { .. }
            | TransportError::QosNotSupported => FailureClass::ClientUnrecoverable,
            TransportError::ServerBusy { .. } | TransportError::ResponseTimeout { .. } => {
                FailureClass::ServerTransient
            }
            TransportError::MalformedResponse { .. } | TransportError::Rejected { .. } => {
                FailureClass::ServerUnrecoverable
            }
            TransportError::Other(_) => FailureClass::None,
        }
    }
}
