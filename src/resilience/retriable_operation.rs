//! # Retriable Operations
//!
//! A reusable state machine that wraps any fallible, possibly long-running
//! operation with retry, backoff, timeout, expiration and cooperative
//! cancellation.
//!
//! ## Overview
//!
//! The owner of a [`RetriableOperationContext`] calls
//! [`RetriableOperationContext::do_work`] on every tick of its polling loop.
//! The context decides whether the wrapped [`RetriableOperation`] is due,
//! invokes it, and interprets the [`AttemptOutcome`] it returns:
//!
//! ```text
//!             init                    do_work (due)
//! NotStarted ──────▶ (scheduled) ─────────────────▶ InProgress ──┐
//!                                                      │         │ Pending
//!                     ┌──────── Completed ◀────────────┤         │ (polled)
//!                     │                                │◀────────┘
//!                     │   Failed(transient)            ▼
//!                     │ ┌──────────────────── FailureRetriable ── backoff ──▶ InProgress
//!                     │ │ retries exhausted     │
//!                     ▼ ▼                       └── expiration ──▶ Expired
//!               Completed / Failure / TimedOut / Cancelled / Destroyed
//! ```
//!
//! Unrecoverable failure classes skip the retry path entirely. Terminal
//! contexts are never re-invoked.

use super::backoff::BackoffCalculator;
use super::retry_params::{FailureClass, RetryParamsTable};
use crate::utils::clock::SharedClock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Lifecycle state of a retriable operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    NotStarted,
    InProgress,
    FailureRetriable,
    Failure,
    Cancelling,
    Cancelled,
    TimedOut,
    Expired,
    Completed,
    Destroyed,
}

impl OperationState {
    /// Check if this is a terminal state (the context must not run again)
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Failure
                | Self::Cancelled
                | Self::TimedOut
                | Self::Expired
                | Self::Completed
                | Self::Destroyed
        )
    }

    /// Check if the next-execution timer governs this state
    pub fn is_scheduled(self) -> bool {
        matches!(
            self,
            Self::NotStarted | Self::InProgress | Self::FailureRetriable
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::NotStarted | Self::InProgress | Self::FailureRetriable
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::FailureRetriable => write!(f, "failure_retriable"),
            Self::Failure => write!(f, "failure"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Expired => write!(f, "expired"),
            Self::Completed => write!(f, "completed"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// What a single invocation of [`RetriableOperation::do_work`] achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Attempt still running; poll again on the next tick
    Pending,
    Completed,
    /// Attempt failed; the class selects retry parameters
    Failed(FailureClass),
    /// Operation observed a cancellation and stopped
    Cancelled,
}

/// Read-only view of a context handed to operation hooks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub state: OperationState,
    pub last_failure_class: FailureClass,
    pub attempt_count: u32,
    pub now: i64,
    pub next_execution_time: i64,
    pub expiration_time: Option<i64>,
    pub last_execution_time: Option<i64>,
    pub last_failure_time: Option<i64>,
    pub last_success_time: Option<i64>,
}

/// Behavior plugged into a [`RetriableOperationContext`]
///
/// Only [`RetriableOperation::name`] and [`RetriableOperation::do_work`] are
/// required; every hook defaults to a no-op.
pub trait RetriableOperation: Send {
    fn name(&self) -> &str;

    /// Run or poll one attempt and classify its outcome
    fn do_work(&mut self, status: &OperationStatus) -> AttemptOutcome;

    /// Request cooperative cancellation. Returns `true` once the operation
    /// has stopped; `false` means it will stop by the next tick.
    fn cancel(&mut self) -> bool {
        true
    }

    /// Reset per-attempt state before the next scheduled attempt
    fn retry(&mut self, _status: &OperationStatus) {}

    /// Final bookkeeping after a successful attempt
    fn complete(&mut self, _status: &OperationStatus) {}

    /// Extra delay added on top of the computed backoff
    fn additional_retry_delay_secs(&self, _class: FailureClass) -> i64 {
        0
    }

    fn on_success(&mut self, _status: &OperationStatus) {}
    fn on_failure(&mut self, _status: &OperationStatus) {}
    fn on_retry(&mut self, _status: &OperationStatus) {}
    fn on_expired(&mut self, _status: &OperationStatus) {}

    /// Release resources held by the operation
    fn destroy(&mut self) {}
}

/// Scheduling parameters of a retriable operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationTimings {
    /// Upper bound for a single in-progress attempt; `0` disables it
    pub operation_timeout_secs: i64,
    /// Delay before the first attempt when not started immediately
    pub operation_interval_secs: i64,
    /// Lifetime of the whole operation from `init`; `None` never expires
    pub expiration_secs: Option<i64>,
}

impl Default for OperationTimings {
    fn default() -> Self {
        Self {
            operation_timeout_secs: 0,
            operation_interval_secs: 0,
            expiration_secs: None,
        }
    }
}

/// Retry/timeout/expiration driver around a [`RetriableOperation`]
#[derive(Debug)]
pub struct RetriableOperationContext<O> {
    operation: O,
    state: OperationState,
    last_failure_class: FailureClass,
    retry_params: RetryParamsTable,
    timings: OperationTimings,
    next_execution_time: i64,
    expiration_time: Option<i64>,
    attempt_count: u32,
    attempt_started_at: Option<i64>,
    last_execution_time: Option<i64>,
    last_failure_time: Option<i64>,
    last_success_time: Option<i64>,
    calculator: BackoffCalculator,
    clock: SharedClock,
}

impl<O: RetriableOperation> RetriableOperationContext<O> {
    pub fn new(
        operation: O,
        timings: OperationTimings,
        retry_params: RetryParamsTable,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now_secs();
        Self {
            operation,
            state: OperationState::NotStarted,
            last_failure_class: FailureClass::None,
            retry_params,
            timings,
            next_execution_time: now,
            expiration_time: None,
            attempt_count: 0,
            attempt_started_at: None,
            last_execution_time: None,
            last_failure_time: None,
            last_success_time: None,
            calculator: BackoffCalculator::new(),
            clock,
        }
    }

    /// Replace the jitter source, e.g. with a seeded calculator
    pub fn with_calculator(mut self, calculator: BackoffCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    /// Reset the context and schedule the first attempt
    pub fn init(&mut self, start_now: bool) {
        let now = self.clock.now_secs();
        self.state = OperationState::NotStarted;
        self.last_failure_class = FailureClass::None;
        self.attempt_count = 0;
        self.attempt_started_at = None;
        self.next_execution_time = if start_now {
            now
        } else {
            now.saturating_add(self.timings.operation_interval_secs)
        };
        self.expiration_time = self.timings.expiration_secs.map(|ttl| now.saturating_add(ttl));

        debug!(
            operation = %self.operation.name(),
            next_execution_time = self.next_execution_time,
            expiration_time = ?self.expiration_time,
            "🔁 RETRIABLE: Initialized"
        );
    }

    /// Advance the operation by one polling tick
    pub fn do_work(&mut self) -> OperationState {
        if self.state.is_terminal() {
            return self.state;
        }

        let now = self.clock.now_secs();

        if self.state == OperationState::Cancelling {
            self.transition(OperationState::Cancelled);
            return self.state;
        }

        if self.attempt_timed_out(now) {
            warn!(
                operation = %self.operation.name(),
                timeout_secs = self.timings.operation_timeout_secs,
                "⌛ RETRIABLE: Attempt exceeded operation timeout"
            );
            self.operation.cancel();
            self.transition(OperationState::TimedOut);
            let status = self.status_at(now);
            self.operation.on_failure(&status);
            return self.state;
        }

        if self.is_expired(now) {
            self.expire(now);
            return self.state;
        }

        if now < self.next_execution_time {
            return self.state;
        }

        if self.state != OperationState::InProgress {
            self.attempt_started_at = Some(now);
            self.last_execution_time = Some(now);
            self.transition(OperationState::InProgress);
        }

        let status = self.status_at(now);
        match self.operation.do_work(&status) {
            AttemptOutcome::Pending => {}
            AttemptOutcome::Completed => self.succeed(now),
            AttemptOutcome::Cancelled => self.transition(OperationState::Cancelled),
            AttemptOutcome::Failed(class) => self.fail(class, now),
        }

        self.state
    }

    /// Ask the operation to stop; accepted only from a running state
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_cancellable() {
            return false;
        }

        info!(
            operation = %self.operation.name(),
            state = %self.state,
            "🛑 RETRIABLE: Cancelling"
        );
        self.transition(OperationState::Cancelling);
        if self.operation.cancel() {
            self.transition(OperationState::Cancelled);
        }
        true
    }

    /// Release the operation; the context is unusable afterwards
    pub fn destroy(&mut self) {
        if self.state != OperationState::Destroyed {
            self.operation.destroy();
            self.transition(OperationState::Destroyed);
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_failure_class(&self) -> FailureClass {
        self.last_failure_class
    }

    pub fn next_execution_time(&self) -> i64 {
        self.next_execution_time
    }

    pub fn expiration_time(&self) -> Option<i64> {
        self.expiration_time
    }

    pub fn retry_params(&self) -> &RetryParamsTable {
        &self.retry_params
    }

    pub fn operation(&self) -> &O {
        &self.operation
    }

    pub fn operation_mut(&mut self) -> &mut O {
        &mut self.operation
    }

    pub fn status(&self) -> OperationStatus {
        self.status_at(self.clock.now_secs())
    }

    fn status_at(&self, now: i64) -> OperationStatus {
        OperationStatus {
            state: self.state,
            last_failure_class: self.last_failure_class,
            attempt_count: self.attempt_count,
            now,
            next_execution_time: self.next_execution_time,
            expiration_time: self.expiration_time,
            last_execution_time: self.last_execution_time,
            last_failure_time: self.last_failure_time,
            last_success_time: self.last_success_time,
        }
    }

    fn attempt_timed_out(&self, now: i64) -> bool {
        self.state == OperationState::InProgress
            && self.timings.operation_timeout_secs > 0
            && self
                .attempt_started_at
                .is_some_and(|started| {
                    now >= started.saturating_add(self.timings.operation_timeout_secs)
                })
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expiration_time.is_some_and(|expiration| now >= expiration)
    }

    fn expire(&mut self, now: i64) {
        info!(
            operation = %self.operation.name(),
            attempts = self.attempt_count,
            "⏰ RETRIABLE: Operation expired"
        );
        self.transition(OperationState::Expired);
        let status = self.status_at(now);
        self.operation.on_expired(&status);
    }

    fn succeed(&mut self, now: i64) {
        self.last_success_time = Some(now);
        self.attempt_started_at = None;
        self.transition(OperationState::Completed);

        info!(
            operation = %self.operation.name(),
            attempts = self.attempt_count,
            "✅ RETRIABLE: Operation completed"
        );

        let status = self.status_at(now);
        self.operation.on_success(&status);
        self.operation.complete(&status);
    }

    fn fail(&mut self, class: FailureClass, now: i64) {
        self.last_failure_class = class;
        self.last_failure_time = Some(now);
        self.attempt_started_at = None;
        self.attempt_count = self.attempt_count.saturating_add(1);

        let params = *self.retry_params.get(class);

        if class.is_unrecoverable() || self.attempt_count >= params.max_retries {
            warn!(
                operation = %self.operation.name(),
                failure_class = %class,
                attempts = self.attempt_count,
                max_retries = params.max_retries,
                "❌ RETRIABLE: Operation failed"
            );
            self.transition(OperationState::Failure);
            let status = self.status_at(now);
            self.operation.on_failure(&status);
            return;
        }

        if self.is_expired(now) {
            self.expire(now);
            return;
        }

        self.transition(OperationState::FailureRetriable);
        let additional = self.operation.additional_retry_delay_secs(class);
        let backoff = self
            .calculator
            .next_retry_for(now, additional, self.attempt_count, &params);
        self.next_execution_time = backoff.next_retry_timestamp;

        info!(
            operation = %self.operation.name(),
            failure_class = %class,
            attempts = self.attempt_count,
            delay_secs = backoff.delay_seconds,
            next_execution_time = self.next_execution_time,
            "🔁 RETRIABLE: Retry scheduled"
        );

        let status = self.status_at(now);
        self.operation.retry(&status);
        self.operation.on_retry(&status);
    }

    fn transition(&mut self, to: OperationState) {
        if self.state != to {
            debug!(
                operation = %self.operation.name(),
                from = %self.state,
                to = %to,
                "🔁 RETRIABLE: State transition"
            );
            self.state = to;
        }
    }
}

/// Object-safe view of a context, used by the agent's polling loop
pub trait PolledOperation: Send {
    fn name(&self) -> &str;
    fn poll(&mut self) -> OperationState;
    fn request_cancel(&mut self) -> bool;
    fn current_state(&self) -> OperationState;
    fn current_status(&self) -> OperationStatus;
    /// Start over, first attempt one interval from now
    fn reschedule(&mut self);
    fn release(&mut self);
}

impl<O: RetriableOperation> PolledOperation for RetriableOperationContext<O> {
    fn name(&self) -> &str {
        self.operation.name()
    }

    fn poll(&mut self) -> OperationState {
        self.do_work()
    }

    fn request_cancel(&mut self) -> bool {
        self.cancel()
    }

    fn current_state(&self) -> OperationState {
        self.state
    }

    fn current_status(&self) -> OperationStatus {
        self.status()
    }

    fn reschedule(&mut self) {
        self.init(false)
    }

    fn release(&mut self) {
        self.destroy()
    }
}
