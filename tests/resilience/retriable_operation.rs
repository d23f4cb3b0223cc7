use std::sync::Arc;
use update_agent_core::resilience::{
    AttemptOutcome, FailureClass, OperationState, OperationStatus, OperationTimings,
    RetriableOperation, RetriableOperationContext, RetryParams, RetryParamsTable,
};
use update_agent_core::utils::clock::{Clock, ManualClock};

/// Fails with `class` until `succeed_after` attempts have been made
#[derive(Debug)]
struct Flaky {
    class: FailureClass,
    succeed_after: u32,
    attempts: u32,
    hang: bool,
    retries_seen: Vec<u32>,
    expired: bool,
}

impl Flaky {
    fn new(class: FailureClass, succeed_after: u32) -> Self {
        Self {
            class,
            succeed_after,
            attempts: 0,
            hang: false,
            retries_seen: Vec::new(),
            expired: false,
        }
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(FailureClass::None, u32::MAX)
        }
    }
}

impl RetriableOperation for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn do_work(&mut self, _status: &OperationStatus) -> AttemptOutcome {
        if self.hang {
            return AttemptOutcome::Pending;
        }
        self.attempts += 1;
        if self.attempts > self.succeed_after {
            AttemptOutcome::Completed
        } else {
            AttemptOutcome::Failed(self.class)
        }
    }

    fn on_retry(&mut self, status: &OperationStatus) {
        self.retries_seen.push(status.attempt_count);
    }

    fn on_expired(&mut self, _status: &OperationStatus) {
        self.expired = true;
    }
}

fn context(
    op: Flaky,
    timings: OperationTimings,
    table: RetryParamsTable,
    clock: &ManualClock,
) -> RetriableOperationContext<Flaky> {
    let mut ctx = RetriableOperationContext::new(op, timings, table, Arc::new(clock.clone()));
    ctx.init(true);
    ctx
}

/// Drive until terminal, jumping the clock to each scheduled attempt
fn run_to_end(ctx: &mut RetriableOperationContext<Flaky>, clock: &ManualClock) -> OperationState {
    for _ in 0..100 {
        let state = ctx.do_work();
        if state.is_terminal() {
            return state;
        }
        if ctx.next_execution_time() > clock.now_secs() {
            clock.set(ctx.next_execution_time());
        }
    }
    panic!("operation did not finish");
}

#[test]
fn test_transient_failures_retry_until_success() {
    let clock = ManualClock::default();
    let mut ctx = context(
        Flaky::new(FailureClass::ServerTransient, 3),
        OperationTimings::default(),
        RetryParamsTable::default(),
        &clock,
    );

    assert_eq!(run_to_end(&mut ctx, &clock), OperationState::Completed);
    assert_eq!(ctx.attempt_count(), 3);
    assert_eq!(ctx.operation().retries_seen, vec![1, 2, 3]);
}

#[test]
fn test_retries_are_exhausted() {
    let clock = ManualClock::default();
    let mut table = RetryParamsTable::default();
    table.client_transient = RetryParams::default().with_max_retries(3);
    let mut ctx = context(
        Flaky::new(FailureClass::ClientTransient, u32::MAX),
        OperationTimings::default(),
        table,
        &clock,
    );

    assert_eq!(run_to_end(&mut ctx, &clock), OperationState::Failure);
    assert_eq!(ctx.attempt_count(), 3);
    assert_eq!(ctx.last_failure_class(), FailureClass::ClientTransient);
}

#[test]
fn test_unrecoverable_failure_never_retries() {
    let clock = ManualClock::default();
    let mut ctx = context(
        Flaky::new(FailureClass::ServerUnrecoverable, u32::MAX),
        OperationTimings::default(),
        RetryParamsTable::uniform(RetryParams::default()),
        &clock,
    );

    assert_eq!(ctx.do_work(), OperationState::Failure);
    assert_eq!(ctx.attempt_count(), 1);
    assert!(ctx.operation().retries_seen.is_empty());
}

#[test]
fn test_no_attempt_before_scheduled_time() {
    let clock = ManualClock::default();
    let mut ctx = context(
        Flaky::new(FailureClass::ServerTransient, 1),
        OperationTimings::default(),
        RetryParamsTable::default(),
        &clock,
    );

    assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
    let scheduled = ctx.next_execution_time();
    assert!(scheduled > clock.now_secs());

    clock.set(scheduled - 1);
    assert_eq!(ctx.do_work(), OperationState::FailureRetriable);
    assert_eq!(ctx.operation().attempts, 1);

    clock.set(scheduled);
    assert_eq!(ctx.do_work(), OperationState::Completed);
}

#[test]
fn test_delayed_start_waits_one_interval() {
    let clock = ManualClock::default();
    let timings = OperationTimings {
        operation_interval_secs: 30,
        ..OperationTimings::default()
    };
    let mut ctx = RetriableOperationContext::new(
        Flaky::new(FailureClass::None, 0),
        timings,
        RetryParamsTable::default(),
        Arc::new(clock.clone()),
    );
    ctx.init(false);

    assert_eq!(ctx.do_work(), OperationState::NotStarted);
    clock.advance(30);
    assert_eq!(ctx.do_work(), OperationState::Completed);
}

#[test]
fn test_expiration_ends_retrying() {
    let clock = ManualClock::default();
    let timings = OperationTimings {
        expiration_secs: Some(20),
        ..OperationTimings::default()
    };
    let mut ctx = context(
        Flaky::new(FailureClass::ServerTransient, u32::MAX),
        timings,
        RetryParamsTable::default(),
        &clock,
    );

    assert_eq!(run_to_end(&mut ctx, &clock), OperationState::Expired);
    assert!(ctx.operation().expired);
    assert!(clock.now_secs() <= ctx.expiration_time().unwrap() + 64);
}

#[test]
fn test_hanging_attempt_times_out() {
    let clock = ManualClock::default();
    let timings = OperationTimings {
        operation_timeout_secs: 10,
        ..OperationTimings::default()
    };
    let mut ctx = context(Flaky::hanging(), timings, RetryParamsTable::default(), &clock);

    assert_eq!(ctx.do_work(), OperationState::InProgress);
    clock.advance(9);
    assert_eq!(ctx.do_work(), OperationState::InProgress);
    clock.advance(1);
    assert_eq!(ctx.do_work(), OperationState::TimedOut);
}

#[test]
fn test_cancel_is_cooperative() {
    let clock = ManualClock::default();
    let mut ctx = context(
        Flaky::hanging(),
        OperationTimings::default(),
        RetryParamsTable::default(),
        &clock,
    );

    assert_eq!(ctx.do_work(), OperationState::InProgress);
    assert!(ctx.cancel());
    assert_eq!(ctx.state(), OperationState::Cancelled);
    assert!(!ctx.cancel());

    ctx.destroy();
    assert_eq!(ctx.state(), OperationState::Destroyed);
    assert_eq!(ctx.do_work(), OperationState::Destroyed);
}

#[test]
fn test_huge_timings_saturate() {
    let clock = ManualClock::default();
    clock.set(1_000);
    let timings = OperationTimings {
        operation_interval_secs: i64::MAX,
        expiration_secs: Some(i64::MAX),
        ..OperationTimings::default()
    };
    let mut ctx = RetriableOperationContext::new(
        Flaky::new(FailureClass::None, 0),
        timings,
        RetryParamsTable::default(),
        Arc::new(clock.clone()),
    );
    ctx.init(false);

    assert_eq!(ctx.next_execution_time(), i64::MAX);
    assert_eq!(ctx.expiration_time(), Some(i64::MAX));
    assert_eq!(ctx.do_work(), OperationState::NotStarted);
}
