//! # Enrollment Status Request
//!
//! Asks the service whether this device is enrolled. One attempt publishes
//! an `enr_req` with a fresh correlation id and waits for the matching
//! response:
//!
//! ```json
//! { "IsEnrolled": true, "ScopeId": "scope-1" }
//! ```
//!
//! A device reported as not enrolled is a server-transient failure; the
//! retry parameters decide when to ask again.

use super::channel::{OutboundRequest, SharedChannel};
use super::request_tracker::RequestTracker;
use crate::constants::operations::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::orchestration::{FailureClassifier, StandardFailureClassifier, TransportError};
use crate::resilience::{AttemptOutcome, FailureClass, OperationStatus, RetriableOperation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ENROLLMENT_REQUEST_TYPE: &str = "enr_req";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Unknown,
    Requesting,
    NotEnrolled,
    Enrolled,
}

impl Default for EnrollmentState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Requesting => write!(f, "requesting"),
            Self::NotEnrolled => write!(f, "not_enrolled"),
            Self::Enrolled => write!(f, "enrolled"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnrollmentResponse {
    is_enrolled: bool,
    #[serde(default)]
    scope_id: Option<String>,
}

pub struct EnrollmentOperation {
    channel: SharedChannel,
    classifier: Arc<dyn FailureClassifier>,
    tracker: RequestTracker,
    state: EnrollmentState,
    scope_id: Option<String>,
}

impl fmt::Debug for EnrollmentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentOperation")
            .field("state", &self.state)
            .field("scope_id", &self.scope_id)
            .field("in_flight", &self.tracker.in_flight())
            .finish()
    }
}

impl EnrollmentOperation {
    pub fn new(channel: SharedChannel) -> Self {
        Self {
            channel,
            classifier: Arc::new(StandardFailureClassifier::new()),
            tracker: RequestTracker::new(DEFAULT_REQUEST_TIMEOUT_SECS),
            state: EnrollmentState::Unknown,
            scope_id: None,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout_secs: i64) -> Self {
        self.tracker = RequestTracker::new(request_timeout_secs);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn enrollment_state(&self) -> EnrollmentState {
        self.state
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.tracker.correlation_id()
    }

    fn fail(&mut self, error: &TransportError) -> AttemptOutcome {
        let class = self.classifier.classify(error);
        warn!(error = %error, failure_class = %class, "📝 ENROLLMENT: Request failed");
        self.tracker.clear();
        self.state = EnrollmentState::Unknown;
        AttemptOutcome::Failed(class)
    }

    fn send_request(&mut self, now: i64) -> AttemptOutcome {
        let request = OutboundRequest {
            message_type: ENROLLMENT_REQUEST_TYPE.to_string(),
            correlation_id: RequestTracker::new_correlation_id(),
            payload: json!({}),
        };

        let published = {
            let mut channel = self.channel.lock();
            if !channel.is_connected() {
                Err(TransportError::NoConnection)
            } else {
                channel.publish(&request)
            }
        };

        match published {
            Ok(()) => {
                info!(correlation_id = %request.correlation_id, "📝 ENROLLMENT: --> enr_req");
                self.tracker.start(request.correlation_id, now);
                self.state = EnrollmentState::Requesting;
                AttemptOutcome::Pending
            }
            Err(e) => self.fail(&e),
        }
    }

    fn handle_response(&mut self, payload: Value) -> AttemptOutcome {
        let response: EnrollmentResponse = match serde_json::from_value(payload) {
            Ok(response) => response,
            Err(e) => return self.fail(&TransportError::malformed_response(e.to_string())),
        };
        self.tracker.clear();

        if response.is_enrolled {
            info!(scope_id = ?response.scope_id, "📝 ENROLLMENT: <-- device is enrolled");
            self.state = EnrollmentState::Enrolled;
            self.scope_id = response.scope_id;
            AttemptOutcome::Completed
        } else {
            info!("📝 ENROLLMENT: <-- device is not enrolled yet");
            self.state = EnrollmentState::NotEnrolled;
            AttemptOutcome::Failed(FailureClass::ServerTransient)
        }
    }
}

impl RetriableOperation for EnrollmentOperation {
    fn name(&self) -> &str {
        "enrollment"
    }

    fn do_work(&mut self, status: &OperationStatus) -> AttemptOutcome {
        if self.state == EnrollmentState::Enrolled {
            return AttemptOutcome::Completed;
        }

        let Some(correlation_id) = self.tracker.correlation_id().map(str::to_string) else {
            return self.send_request(status.now);
        };

        let response = self.channel.lock().take_response(&correlation_id);
        match response {
            Some(Ok(payload)) => self.handle_response(payload),
            Some(Err(e)) => self.fail(&e),
            None => match self.tracker.check_timeout(status.now) {
                Some(timeout) => self.fail(&timeout),
                None => {
                    debug!(correlation_id = %correlation_id, "📝 ENROLLMENT: Awaiting response");
                    AttemptOutcome::Pending
                }
            },
        }
    }

    fn cancel(&mut self) -> bool {
        self.tracker.clear();
        self.state = EnrollmentState::Unknown;
        true
    }

    fn retry(&mut self, _status: &OperationStatus) {
        self.tracker.clear();
        if self.state == EnrollmentState::Requesting {
            self.state = EnrollmentState::Unknown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeChannel;
    use crate::resilience::{
        OperationState, OperationTimings, RetriableOperationContext, RetryParams,
        RetryParamsTable,
    };
    use crate::utils::clock::ManualClock;

    fn context(
        channel: &FakeChannel,
        clock: &ManualClock,
    ) -> RetriableOperationContext<EnrollmentOperation> {
        let mut table = RetryParamsTable::default();
        table.server_transient = RetryParams {
            max_retries: 3,
            ..RetryParams::default()
        };
        let mut ctx = RetriableOperationContext::new(
            EnrollmentOperation::new(channel.shared()),
            OperationTimings::default(),
            table,
            Arc::new(clock.clone()),
        );
        ctx.init(true);
        ctx
    }

    #[test]
    fn test_enrolled_response_completes() {
        let channel = FakeChannel::connected();
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        assert_eq!(ctx.do_work(), OperationState::InProgress);
        let sent = channel.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_type, ENROLLMENT_REQUEST_TYPE);

        channel.respond(
            &sent[0].correlation_id,
            Ok(json!({ "IsEnrolled": true, "ScopeId": "scope-1" })),
        );
        assert_eq!(ctx.do_work(), OperationState::Completed);
        assert_eq!(ctx.operation().enrollment_state(), EnrollmentState::Enrolled);
        assert_eq!(ctx.operation().scope_id(), Some("scope-1"));
    }

    #[test]
    fn test_response_for_other_request_is_ignored() {
        let channel = FakeChannel::connected();
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        ctx.do_work();
        channel.respond("stale-correlation", Ok(json!({ "IsEnrolled": true })));
        assert_eq!(ctx.do_work(), OperationState::InProgress);
        assert_eq!(ctx.operation().enrollment_state(), EnrollmentState::Requesting);
    }

    #[test]
    fn test_not_enrolled_schedules_retry_with_new_correlation_id() {
        let channel = FakeChannel::connected();
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        ctx.do_work();
        let first = channel.published()[0].correlation_id.clone();
        channel.respond(&first, Ok(json!({ "IsEnrolled": false })));
        assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
        assert_eq!(ctx.last_failure_class(), FailureClass::ServerTransient);

        clock.set(ctx.next_execution_time());
        ctx.do_work();
        let sent = channel.published();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[1].correlation_id, first);
    }

    #[test]
    fn test_request_timeout_is_server_transient() {
        let channel = FakeChannel::connected();
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        ctx.do_work();
        clock.advance(DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
        assert_eq!(ctx.last_failure_class(), FailureClass::ServerTransient);
        assert!(ctx.operation().correlation_id().is_none());
    }

    #[test]
    fn test_disconnected_channel_is_client_transient() {
        let channel = FakeChannel::disconnected();
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
        assert_eq!(ctx.last_failure_class(), FailureClass::ClientTransient);
        assert!(channel.published().is_empty());
    }

    #[test]
    fn test_invalid_request_fails_without_retry() {
        let channel = FakeChannel::connected();
        channel.fail_next_publish(TransportError::invalid_request("bad topic"));
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        assert_eq!(ctx.do_work(), OperationState::Failure);
        assert_eq!(ctx.last_failure_class(), FailureClass::ClientUnrecoverable);
    }
}
