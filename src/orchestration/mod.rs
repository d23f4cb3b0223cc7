//! # Orchestration Decision Logic
//!
//! Stateless policy consumed by the workflow state machine and by retriable
//! operations.
//!
//! - [`decisions`]: action to step mapping, completion test, cloud reporting
//!   suppression, retry vs. duplicate classification of request tokens
//! - [`error_classifier`]: transport error to [`crate::resilience::FailureClass`]

pub mod decisions;
pub mod error_classifier;

pub use decisions::{
    get_workflow_step, is_retry_applicable, is_workflow_complete, should_not_report_to_cloud,
};
pub use error_classifier::{FailureClassifier, StandardFailureClassifier, TransportError};
