//! PowStore Time Library
//!
//! Trusted time authority for commit-reveal scheduling.
//!
//! # Features
//! - Microsecond precision timestamps
//! - Pluggable trusted time sources
//! - Rollback detection (a source reporting a time earlier than the last
//!   observed reading is rejected, never silently clamped)
//! - Reveal eligibility and remaining-wait computation

pub mod clock;
pub mod source;
pub mod timestamp;

pub use clock::{ClockError, RevealClock};
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use timestamp::TimestampMicros;
