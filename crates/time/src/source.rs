//! Time sources backing the reveal clock.

use crate::timestamp::TimestampMicros;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock readings the service is willing to trust.
pub trait TimeSource: Send + Sync {
    /// Current reading in microseconds since the UNIX epoch.
    fn now_us(&self) -> u64;

    /// Human readable name used in logs.
    fn name(&self) -> &'static str;
}

/// Operating system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros()
            .min(u64::MAX as u128) as u64
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Manually driven source for tests and simulations.
///
/// Clones share the same underlying reading, so a test can hold one handle
/// while the clock under test owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    current_us: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: TimestampMicros) -> Self {
        Self {
            current_us: Arc::new(AtomicU64::new(start.0)),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(TimestampMicros(SystemTimeSource.now_us()))
    }

    pub fn advance(&self, by: Duration) {
        let micros = by.as_micros().min(u64::MAX as u128) as u64;
        self.current_us.fetch_add(micros, Ordering::SeqCst);
    }

    /// Force the reading to `to`, including backwards (used to simulate rollback).
    pub fn set(&self, to: TimestampMicros) {
        self.current_us.store(to.0, Ordering::SeqCst);
    }

    pub fn current(&self) -> TimestampMicros {
        TimestampMicros(self.current_us.load(Ordering::SeqCst))
    }
}

impl TimeSource for ManualTimeSource {
    fn now_us(&self) -> u64 {
        self.current_us.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}
