//! # Retry Policy Calculator
//!
//! Computes the absolute timestamp of the next attempt of a retriable
//! operation from its attempt count and [`RetryParams`].
//!
//! ## Algorithm
//!
//! ```text
//! base   = min(max_delay_secs, initial_delay_unit_ms / 1000 * 2^min(attempt, 9))
//! jitter = base * (max_jitter_percent / 100) * U[0, 1)
//! next   = now + base + jitter + additional_delay_secs
//! ```
//!
//! `max_delay_secs` caps only the exponential term. `additional_delay_secs`
//! is added unconditionally, so a caller-supplied extra delay can push the
//! next attempt past the cap.
//!
//! Invalid inputs (negative cap or unit, jitter outside `0..=100`) never
//! fail the caller: the calculator falls back to a fixed wait instead.
//!
//! ## Determinism
//!
//! Jitter comes from an owned [`StdRng`]. [`BackoffCalculator::seeded`]
//! yields reproducible schedules for tests.

use super::retry_params::RetryParams;
use crate::constants::retry;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a retry delay was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Exponential,
    Fallback,
}

/// Backoff delay split into its deterministic and random parts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffDelay {
    pub base_secs: f64,
    pub jitter_secs: f64,
}

impl BackoffDelay {
    pub fn total_secs(&self) -> f64 {
        self.base_secs + self.jitter_secs
    }
}

/// Result of a next-attempt calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffResult {
    /// Whole seconds between `now` and the next attempt
    pub delay_seconds: i64,
    pub backoff_type: BackoffType,
    /// Absolute time of the next attempt, seconds since the Unix epoch
    pub next_retry_timestamp: i64,
}

impl BackoffResult {
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.next_retry_timestamp, 0).single()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BackoffError {
    #[error("Invalid max delay: {0} seconds")]
    InvalidMaxDelay(i64),

    #[error("Invalid initial delay unit: {0} milliseconds")]
    InvalidInitialDelay(i64),

    #[error("Invalid max jitter percent: {0} (expected 0..=100)")]
    InvalidJitter(f64),
}

/// Exponential backoff with bounded uniform jitter
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    rng: StdRng,
    fallback_wait_time_secs: i64,
}

impl BackoffCalculator {
    /// Calculator seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            fallback_wait_time_secs: retry::FALLBACK_WAIT_TIME_SECS,
        }
    }

    /// Calculator with a reproducible jitter sequence
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            fallback_wait_time_secs: retry::FALLBACK_WAIT_TIME_SECS,
        }
    }

    pub fn with_fallback_wait(mut self, secs: i64) -> Self {
        self.fallback_wait_time_secs = secs;
        self
    }

    /// Exponential term only, clamped to `max_delay_secs`
    pub fn base_delay_secs(
        attempt: u32,
        initial_delay_unit_ms: i64,
        max_delay_secs: i64,
    ) -> Result<f64, BackoffError> {
        if max_delay_secs < 0 {
            return Err(BackoffError::InvalidMaxDelay(max_delay_secs));
        }
        if initial_delay_unit_ms < 0 {
            return Err(BackoffError::InvalidInitialDelay(initial_delay_unit_ms));
        }

        let exponent = attempt.min(retry::MAX_RETRY_EXPONENT);
        let delay = (initial_delay_unit_ms as f64 / 1000.0) * f64::from(1u32 << exponent);

        Ok(delay.min(max_delay_secs as f64))
    }

    /// Base delay plus a random jitter of at most `max_jitter_percent`% of it
    pub fn delay(
        &mut self,
        attempt: u32,
        initial_delay_unit_ms: i64,
        max_delay_secs: i64,
        max_jitter_percent: f64,
    ) -> Result<BackoffDelay, BackoffError> {
        if !max_jitter_percent.is_finite() || !(0.0..=100.0).contains(&max_jitter_percent) {
            return Err(BackoffError::InvalidJitter(max_jitter_percent));
        }

        let base_secs = Self::base_delay_secs(attempt, initial_delay_unit_ms, max_delay_secs)?;
        let sample: f64 = self.rng.gen();
        let jitter_secs = base_secs * (max_jitter_percent / 100.0) * sample;

        Ok(BackoffDelay {
            base_secs,
            jitter_secs,
        })
    }

    /// Absolute timestamp of the next attempt
    ///
    /// Never fails: invalid inputs yield `now + fallback wait`.
    pub fn next_retry_timestamp(
        &mut self,
        now_secs: i64,
        additional_delay_secs: i64,
        attempt: u32,
        initial_delay_unit_ms: i64,
        max_delay_secs: i64,
        max_jitter_percent: f64,
    ) -> BackoffResult {
        let fallback = self.fallback_wait_time_secs;
        self.calculate(
            now_secs,
            additional_delay_secs,
            attempt,
            initial_delay_unit_ms,
            max_delay_secs,
            max_jitter_percent,
            fallback,
        )
    }

    /// Next attempt for a failure class's parameters, using its own fallback wait
    pub fn next_retry_for(
        &mut self,
        now_secs: i64,
        additional_delay_secs: i64,
        attempt: u32,
        params: &RetryParams,
    ) -> BackoffResult {
        self.calculate(
            now_secs,
            additional_delay_secs,
            attempt,
            params.initial_delay_unit_ms,
            params.max_delay_secs,
            params.max_jitter_percent,
            params.fallback_wait_time_secs,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn calculate(
        &mut self,
        now_secs: i64,
        additional_delay_secs: i64,
        attempt: u32,
        initial_delay_unit_ms: i64,
        max_delay_secs: i64,
        max_jitter_percent: f64,
        fallback_wait_time_secs: i64,
    ) -> BackoffResult {
        match self.delay(
            attempt,
            initial_delay_unit_ms,
            max_delay_secs,
            max_jitter_percent,
        ) {
            Ok(delay) => {
                let delay_seconds =
                    (delay.total_secs() as i64).saturating_add(additional_delay_secs);
                BackoffResult {
                    delay_seconds,
                    backoff_type: BackoffType::Exponential,
                    next_retry_timestamp: now_secs.saturating_add(delay_seconds),
                }
            }
            Err(error) => {
                let delay_seconds = fallback_wait_time_secs.max(0);
                warn!(
                    error = %error,
                    fallback_secs = delay_seconds,
                    "⏱️ BACKOFF: Invalid retry parameters, using fallback wait"
                );
                BackoffResult {
                    delay_seconds,
                    backoff_type: BackoffType::Fallback,
                    next_retry_timestamp: now_secs.saturating_add(delay_seconds),
                }
            }
        }
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_doubles_per_attempt() {
        assert_eq!(BackoffCalculator::base_delay_secs(0, 1000, 600).unwrap(), 1.0);
        assert_eq!(BackoffCalculator::base_delay_secs(1, 1000, 600).unwrap(), 2.0);
        assert_eq!(BackoffCalculator::base_delay_secs(5, 1000, 600).unwrap(), 32.0);
    }

    #[test]
    fn test_exponent_is_capped_at_nine() {
        let at_cap = BackoffCalculator::base_delay_secs(9, 1000, i64::MAX).unwrap();
        let beyond = BackoffCalculator::base_delay_secs(40, 1000, i64::MAX).unwrap();
        assert_eq!(at_cap, 512.0);
        assert_eq!(beyond, 512.0);
    }

    #[test]
    fn test_max_delay_clamps_backoff() {
        assert_eq!(BackoffCalculator::base_delay_secs(8, 1000, 60).unwrap(), 60.0);
    }

    #[test]
    fn test_additional_delay_is_outside_the_cap() {
        let mut calc = BackoffCalculator::seeded(7);
        let result = calc.next_retry_timestamp(1_000, 500, 9, 1000, 60, 0.0);
        assert_eq!(result.backoff_type, BackoffType::Exponential);
        assert_eq!(result.delay_seconds, 560);
        assert_eq!(result.next_retry_timestamp, 1_560);
    }

    #[test]
    fn test_invalid_inputs_use_fallback() {
        let mut calc = BackoffCalculator::seeded(1).with_fallback_wait(45);

        let negative_cap = calc.next_retry_timestamp(100, 0, 1, 1000, -1, 5.0);
        assert_eq!(negative_cap.backoff_type, BackoffType::Fallback);
        assert_eq!(negative_cap.next_retry_timestamp, 145);

        let jitter_too_large = calc.next_retry_timestamp(100, 0, 1, 1000, 60, 150.0);
        assert_eq!(jitter_too_large.backoff_type, BackoffType::Fallback);

        let nan_jitter = calc.next_retry_timestamp(100, 0, 1, 1000, 60, f64::NAN);
        assert_eq!(nan_jitter.backoff_type, BackoffType::Fallback);
    }

    #[test]
    fn test_params_fallback_wait_is_used() {
        let mut calc = BackoffCalculator::seeded(1);
        let params = RetryParams {
            max_delay_secs: -5,
            fallback_wait_time_secs: 12,
            ..RetryParams::default()
        };
        let result = calc.next_retry_for(0, 0, 0, &params);
        assert_eq!(result.backoff_type, BackoffType::Fallback);
        assert_eq!(result.delay_seconds, 12);
    }

    #[test]
    fn test_seeded_calculators_agree() {
        let mut a = BackoffCalculator::seeded(42);
        let mut b = BackoffCalculator::seeded(42);
        for attempt in 0..12 {
            assert_eq!(
                a.delay(attempt, 1000, 300, 50.0).unwrap(),
                b.delay(attempt, 1000, 300, 50.0).unwrap()
            );
        }
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let mut calc = BackoffCalculator::seeded(3);
        for attempt in 0..20 {
            let delay = calc.delay(attempt, 1000, 60, 20.0).unwrap();
            assert!(delay.jitter_secs >= 0.0);
            assert!(delay.jitter_secs <= delay.base_secs * 0.2);
        }
    }
}
