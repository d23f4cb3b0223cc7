use proptest::prelude::*;
use update_agent_core::resilience::{BackoffCalculator, BackoffType, RetryParams};

proptest! {
    #[test]
    fn base_delay_never_decreases_with_attempts(
        attempt in 0u32..64,
        unit_ms in 0i64..120_000,
        max_delay in 0i64..100_000,
    ) {
        let current = BackoffCalculator::base_delay_secs(attempt, unit_ms, max_delay).unwrap();
        let next = BackoffCalculator::base_delay_secs(attempt + 1, unit_ms, max_delay).unwrap();
        prop_assert!(next >= current);
    }

    #[test]
    fn base_delay_is_capped(
        attempt in 0u32..64,
        unit_ms in 0i64..120_000,
        max_delay in 0i64..100_000,
    ) {
        let base = BackoffCalculator::base_delay_secs(attempt, unit_ms, max_delay).unwrap();
        prop_assert!(base <= max_delay as f64);
        prop_assert!(base <= (unit_ms as f64 / 1000.0) * 512.0);
    }

    #[test]
    fn jitter_stays_within_percentage(
        seed in any::<u64>(),
        attempt in 0u32..16,
        unit_ms in 1i64..10_000,
        jitter in 0.0f64..=100.0,
    ) {
        let mut calculator = BackoffCalculator::seeded(seed);
        let delay = calculator.delay(attempt, unit_ms, 3600, jitter).unwrap();
        prop_assert!(delay.jitter_secs >= 0.0);
        prop_assert!(delay.jitter_secs <= delay.base_secs * jitter / 100.0 + 1e-9);
    }

    #[test]
    fn additional_delay_is_added_after_cap(
        seed in any::<u64>(),
        attempt in 0u32..32,
        additional in 0i64..10_000,
    ) {
        let mut calculator = BackoffCalculator::seeded(seed);
        let result = calculator.next_retry_timestamp(1_000, additional, attempt, 1000, 60, 5.0);
        prop_assert_eq!(result.backoff_type, BackoffType::Exponential);
        prop_assert!(result.delay_seconds >= additional);
        prop_assert!(result.delay_seconds <= 63 + additional);
        prop_assert_eq!(result.next_retry_timestamp, 1_000 + result.delay_seconds);
    }

    #[test]
    fn invalid_inputs_use_fallback_wait(
        max_delay in i64::MIN..0,
        fallback in 1i64..3600,
    ) {
        let mut calculator = BackoffCalculator::seeded(7).with_fallback_wait(fallback);
        let result = calculator.next_retry_timestamp(500, 0, 3, 1000, max_delay, 5.0);
        prop_assert_eq!(result.backoff_type, BackoffType::Fallback);
        prop_assert_eq!(result.delay_seconds, fallback);
        prop_assert_eq!(result.next_retry_timestamp, 500 + fallback);
    }
}

#[test]
fn test_seeded_calculators_agree() {
    let mut a = BackoffCalculator::seeded(42);
    let mut b = BackoffCalculator::seeded(42);
    for attempt in 0..10 {
        assert_eq!(
            a.next_retry_timestamp(0, 0, attempt, 1000, 600, 50.0),
            b.next_retry_timestamp(0, 0, attempt, 1000, 600, 50.0)
        );
    }
}

#[test]
fn test_per_class_fallback_wait() {
    let params = RetryParams {
        max_jitter_percent: 250.0,
        fallback_wait_time_secs: 90,
        ..RetryParams::default()
    };
    let mut calculator = BackoffCalculator::seeded(1);
    let result = calculator.next_retry_for(100, 0, 1, &params);
    assert_eq!(result.backoff_type, BackoffType::Fallback);
    assert_eq!(result.next_retry_timestamp, 190);
    assert!(result.next_retry_at().is_some());
}

#[test]
fn test_huge_additional_delay_saturates() {
    let mut calculator = BackoffCalculator::seeded(3);
    let result = calculator.next_retry_timestamp(1_000, i64::MAX, 0, 1000, 60, 0.0);
    assert_eq!(result.backoff_type, BackoffType::Exponential);
    assert_eq!(result.delay_seconds, i64::MAX);
    assert_eq!(result.next_retry_timestamp, i64::MAX);
}
