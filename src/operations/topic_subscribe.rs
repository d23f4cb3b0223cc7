//! # Topic Subscription
//!
//! Subscribes the agent to the response and notification topics it needs and
//! waits for the broker to acknowledge every one of them. Subscriptions that
//! are not acknowledged within the request timeout fail the attempt as
//! server-transient; the retry re-subscribes only the missing topics.

use super::channel::SharedChannel;
use crate::constants::operations::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::orchestration::{FailureClassifier, StandardFailureClassifier, TransportError};
use crate::resilience::{AttemptOutcome, OperationStatus, RetriableOperation};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TopicSubscribeOperation {
    channel: SharedChannel,
    classifier: Arc<dyn FailureClassifier>,
    topics: Vec<String>,
    /// Topics subscribed in the current attempt, awaiting acknowledgement
    requested: BTreeSet<String>,
    requested_at: Option<i64>,
    request_timeout_secs: i64,
}

impl fmt::Debug for TopicSubscribeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscribeOperation")
            .field("topics", &self.topics)
            .field("requested", &self.requested)
            .field("requested_at", &self.requested_at)
            .finish()
    }
}

impl TopicSubscribeOperation {
    pub fn new<I, S>(channel: SharedChannel, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channel,
            classifier: Arc::new(StandardFailureClassifier::new()),
            topics: topics.into_iter().map(Into::into).collect(),
            requested: BTreeSet::new(),
            requested_at: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout_secs: i64) -> Self {
        self.request_timeout_secs = request_timeout_secs;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    fn fail(&mut self, error: &TransportError) -> AttemptOutcome {
        let class = self.classifier.classify(error);
        warn!(error = %error, failure_class = %class, "📡 TOPICS: Subscription failed");
        self.requested.clear();
        self.requested_at = None;
        AttemptOutcome::Failed(class)
    }
}

impl RetriableOperation for TopicSubscribeOperation {
    fn name(&self) -> &str {
        "topic_subscribe"
    }

    fn do_work(&mut self, status: &OperationStatus) -> AttemptOutcome {
        let subscribe_result = {
            let mut channel = self.channel.lock();
            if !channel.is_connected() {
                Err(TransportError::NoConnection)
            } else {
                let mut result = Ok(());
                for topic in &self.topics {
                    if channel.is_subscribed(topic) || self.requested.contains(topic) {
                        continue;
                    }
                    if let Err(e) = channel.subscribe(topic) {
                        result = Err(e);
                        break;
                    }
                    debug!(topic = %topic, "📡 TOPICS: --> SUBSCRIBE");
                    self.requested.insert(topic.clone());
                }
                result
            }
        };
        if let Err(e) = subscribe_result {
            return self.fail(&e);
        }
        if self.requested_at.is_none() && !self.requested.is_empty() {
            self.requested_at = Some(status.now);
        }

        let pending: Vec<String> = {
            let channel = self.channel.lock();
            self.topics
                .iter()
                .filter(|topic| !channel.is_subscribed(topic))
                .cloned()
                .collect()
        };

        if pending.is_empty() {
            info!(topics = ?self.topics, "📡 TOPICS: All topics subscribed");
            self.requested.clear();
            self.requested_at = None;
            return AttemptOutcome::Completed;
        }

        let timed_out = self.request_timeout_secs > 0
            && self
                .requested_at
                .is_some_and(|at| status.now >= at.saturating_add(self.request_timeout_secs));
        if timed_out {
            warn!(pending = ?pending, "📡 TOPICS: Subscriptions not acknowledged");
            return self.fail(&TransportError::ResponseTimeout {
                timeout_secs: self.request_timeout_secs,
            });
        }
        AttemptOutcome::Pending
    }

    fn cancel(&mut self) -> bool {
        self.requested.clear();
        self.requested_at = None;
        true
    }

    fn retry(&mut self, _status: &OperationStatus) {
        self.requested.clear();
        self.requested_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{
        FailureClass, OperationState, OperationTimings, RetriableOperationContext,
        RetryParamsTable,
    };
    use crate::test_helpers::FakeChannel;
    use crate::utils::clock::ManualClock;

    fn context(
        channel: &FakeChannel,
        clock: &ManualClock,
    ) -> RetriableOperationContext<TopicSubscribeOperation> {
        let op =
            TopicSubscribeOperation::new(channel.shared(), ["adu/oto/dev1/a", "adu/oto/dev1/b"])
                .with_request_timeout(30);
        let mut ctx = RetriableOperationContext::new(
            op,
            OperationTimings::default(),
            RetryParamsTable::default(),
            Arc::new(clock.clone()),
        );
        ctx.init(true);
        ctx
    }

    #[test]
    fn test_acknowledged_subscriptions_complete() {
        let channel = FakeChannel::connected();
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        assert_eq!(ctx.do_work(), OperationState::Completed);
        assert_eq!(channel.subscribe_requests().len(), 2);
    }

    #[test]
    fn test_waits_for_ack_then_times_out() {
        let channel = FakeChannel::connected();
        channel.set_auto_ack(false);
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        assert_eq!(ctx.do_work(), OperationState::InProgress);
        channel.ack("adu/oto/dev1/a");
        assert_eq!(ctx.do_work(), OperationState::InProgress);

        clock.advance(30);
        assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
        assert_eq!(ctx.last_failure_class(), FailureClass::ServerTransient);

        // Only the unacknowledged topic is subscribed again
        channel.set_auto_ack(true);
        clock.set(ctx.next_execution_time());
        assert_eq!(ctx.do_work(), OperationState::Completed);
        assert_eq!(
            channel.subscribe_requests(),
            vec!["adu/oto/dev1/a", "adu/oto/dev1/b", "adu/oto/dev1/b"]
        );
    }

    #[test]
    fn test_subscribe_error_is_classified() {
        let channel = FakeChannel::connected();
        channel.fail_next_subscribe(TransportError::QosNotSupported);
        let clock = ManualClock::default();
        let mut ctx = context(&channel, &clock);

        assert_eq!(ctx.do_work(), OperationState::Failure);
        assert_eq!(ctx.last_failure_class(), FailureClass::ClientUnrecoverable);
    }
}
