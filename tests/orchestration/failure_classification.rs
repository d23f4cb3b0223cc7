use update_agent_core::orchestration::{
    FailureClassifier, StandardFailureClassifier, TransportError,
};
use update_agent_core::resilience::{FailureClass, RetryParamsTable};

#[test]
fn test_every_transport_error_has_a_class() {
    let classifier = StandardFailureClassifier::new();
    let cases = [
        (TransportError::NoConnection, FailureClass::ClientTransient),
        (TransportError::invalid_request("bad"), FailureClass::ClientUnrecoverable),
        (TransportError::NoMemory, FailureClass::ClientUnrecoverable),
        (
            TransportError::Protocol {
                reason: "bad frame".to_string(),
            },
            FailureClass::ClientUnrecoverable,
        ),
        (TransportError::PayloadTooLarge { size: 1 }, FailureClass::ClientUnrecoverable),
        (TransportError::QosNotSupported, FailureClass::ClientUnrecoverable),
        (TransportError::server_busy("throttled"), FailureClass::ServerTransient),
        (
            TransportError::ResponseTimeout { timeout_secs: 180 },
            FailureClass::ServerTransient,
        ),
        (TransportError::malformed_response("eof"), FailureClass::ServerUnrecoverable),
        (TransportError::rejected("denied"), FailureClass::ServerUnrecoverable),
        (TransportError::Other("?".to_string()), FailureClass::None),
    ];

    for (error, expected) in cases {
        assert_eq!(classifier.classify(&error), expected, "{error}");
    }
}

#[test]
fn test_unrecoverable_classes_never_retry_by_default() {
    let table = RetryParamsTable::default();
    let classifier = StandardFailureClassifier::new();

    for error in [TransportError::NoMemory, TransportError::rejected("no")] {
        let class = classifier.classify(&error);
        assert!(class.is_unrecoverable());
        assert_eq!(table.get(class).max_retries, 0);
    }
    assert!(table.get(FailureClass::ServerTransient).max_retries > 0);
}

/// Classifier that treats every error as server-transient
struct AlwaysRetry;

impl FailureClassifier for AlwaysRetry {
    fn classify(&self, _error: &TransportError) -> FailureClass {
        FailureClass::ServerTransient
    }
}

#[test]
fn test_custom_classifier_plugs_into_operations() {
    use std::sync::Arc;
    use update_agent_core::operations::EnrollmentOperation;
    use update_agent_core::resilience::{
        OperationState, OperationTimings, RetriableOperationContext,
    };
    use update_agent_core::test_helpers::FakeChannel;
    use update_agent_core::utils::clock::ManualClock;

    let channel = FakeChannel::connected();
    channel.fail_next_publish(TransportError::invalid_request("bad topic"));
    let clock = ManualClock::default();
    let op = EnrollmentOperation::new(channel.shared()).with_classifier(Arc::new(AlwaysRetry));
    let mut ctx = RetriableOperationContext::new(
        op,
        OperationTimings::default(),
        RetryParamsTable::default(),
        Arc::new(clock),
    );
    ctx.init(true);

    assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
    assert_eq!(ctx.last_failure_class(), FailureClass::ServerTransient);
}
