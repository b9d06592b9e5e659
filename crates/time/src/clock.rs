//! Reveal clock: trusted "now" plus eligibility rules.
//!
//! The clock remembers the highest reading it has handed out. A source that
//! reports an earlier time afterwards is treated as rolled back and every
//! subsequent `now()` fails until the source catches up again.

use crate::source::{SystemTimeSource, TimeSource};
use crate::timestamp::TimestampMicros;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock skew: source {source_name} reported {observed} after {last_observed} was observed")]
    Skew {
        source_name: &'static str,
        observed: TimestampMicros,
        last_observed: TimestampMicros,
    },
}

#[derive(Debug, Default)]
struct ClockState {
    last_observed_us: u64,
}

/// Time authority consulted for every reveal decision.
#[derive(Clone)]
pub struct RevealClock {
    source: Arc<dyn TimeSource>,
    state: Arc<Mutex<ClockState>>,
    skew_tolerance_us: u64,
}

impl std::fmt::Debug for RevealClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealClock")
            .field("source", &self.source.name())
            .field("skew_tolerance_us", &self.skew_tolerance_us)
            .finish()
    }
}

impl Default for RevealClock {
    fn default() -> Self {
        Self::system()
    }
}

impl RevealClock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(ClockState::default())),
            skew_tolerance_us: 0,
        }
    }

    /// Clock backed by the operating system wall clock.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    /// Accept backwards steps up to `tolerance` without failing. Readings
    /// inside the tolerance are reported as the last observed value.
    pub fn with_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.skew_tolerance_us = tolerance.as_micros().min(u64::MAX as u128) as u64;
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Current trusted time. Never moves backwards.
    pub fn now(&self) -> Result<TimestampMicros, ClockError> {
        let observed = self.source.now_us();
        let mut state = self.state.lock();

        if observed >= state.last_observed_us {
            state.last_observed_us = observed;
            return Ok(TimestampMicros(observed));
        }

        let rollback = state.last_observed_us - observed;
        if rollback <= self.skew_tolerance_us {
            return Ok(TimestampMicros(state.last_observed_us));
        }

        let err = ClockError::Skew {
            source_name: self.source.name(),
            observed: TimestampMicros(observed),
            last_observed: TimestampMicros(state.last_observed_us),
        };
        tracing::error!(
            source = self.source.name(),
            observed_us = observed,
            last_observed_us = state.last_observed_us,
            rollback_us = rollback,
            "time source moved backwards"
        );
        Err(err)
    }

    /// `true` iff `now >= reveal_at`.
    pub fn is_eligible(reveal_at: TimestampMicros, now: TimestampMicros) -> bool {
        now >= reveal_at
    }

    /// Wait left until `reveal_at`; zero once eligible.
    pub fn remaining(reveal_at: TimestampMicros, now: TimestampMicros) -> Duration {
        reveal_at.saturating_duration_since(now)
    }
}
