//! # Resilience Module
//!
//! Retry machinery for every network-backed or long-running sub-operation of
//! the agent.
//!
//! ## Architecture
//!
//! - **Backoff**: exponential delay with bounded jitter and a safe fallback
//! - **Retry parameters**: one [`RetryParams`] entry per [`FailureClass`]
//! - **Retriable operations**: a polled state machine that drives a
//!   [`RetriableOperation`] through retries, timeouts, expiration and
//!   cooperative cancellation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use update_agent_core::resilience::{
//!     AttemptOutcome, OperationStatus, OperationTimings, RetriableOperation,
//!     RetriableOperationContext, RetryParamsTable,
//! };
//! use update_agent_core::utils::clock::SystemClock;
//!
//! struct Ping;
//!
//! impl RetriableOperation for Ping {
//!     fn name(&self) -> &str {
//!         "ping"
//!     }
//!
//!     fn do_work(&mut self, _status: &OperationStatus) -> AttemptOutcome {
//!         AttemptOutcome::Completed
//!     }
//! }
//!
//! let mut ctx = RetriableOperationContext::new(
//!     Ping,
//!     OperationTimings::default(),
//!     RetryParamsTable::default(),
//!     Arc::new(SystemClock),
//! );
//! ctx.init(true);
//! while !ctx.do_work().is_terminal() {}
//! ```

pub mod backoff;
pub mod retriable_operation;
pub mod retry_params;

pub use backoff::{BackoffCalculator, BackoffDelay, BackoffError, BackoffResult, BackoffType};
pub use retriable_operation::{
    AttemptOutcome, OperationState, OperationStatus, OperationTimings, PolledOperation,
    RetriableOperation, RetriableOperationContext,
};
pub use retry_params::{FailureClass, RetryParams, RetryParamsTable};
