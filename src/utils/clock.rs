//! Time source abstraction.
//!
//! Retry timers, operation timeouts and workflow identifiers all read the
//! current time through [`Clock`] so tests can drive time by hand.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of wall-clock time in whole seconds since the Unix epoch
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_secs(&self) -> i64;

    /// Same instant as [`Clock::now_secs`], as a `DateTime`
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.now_secs(), 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// System clock backed by `chrono::Utc::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock shared between a test and the code under test
#[derive(Debug, Clone)]
pub struct ManualClock {
    secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_secs: i64) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(start_secs)),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01T00:00:00Z
        Self::new(1_704_067_200)
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}

pub type SharedClock = Arc<dyn Clock>;
