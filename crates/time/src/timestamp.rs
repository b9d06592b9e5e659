use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Microseconds since the UNIX epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimestampMicros(pub u64);

impl TimestampMicros {
    pub const ZERO: TimestampMicros = TimestampMicros(0);

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Add a duration, saturating at `u64::MAX` microseconds.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        Self(self.0.saturating_add(micros))
    }

    /// Subtract a duration, saturating at the epoch.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        Self(self.0.saturating_sub(micros))
    }

    /// Time elapsed from `earlier` to `self`; zero when `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: TimestampMicros) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TimestampMicros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl From<u64> for TimestampMicros {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
