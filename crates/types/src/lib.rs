//! Shared data model for PowStore commitments.

pub mod commitment;
pub mod ids;
pub mod public_log;

pub use commitment::{CommitmentRecord, CommitmentState, CommitmentView};
pub use ids::{CommitmentId, Digest, IdError, OwnerIdentity, Salt, SealKeyRef, SealedLocator};
pub use public_log::PublicLogEntry;
pub use powstore_time::TimestampMicros;

/// Length in bytes of every commitment salt.
pub const SALT_LEN: usize = 32;
