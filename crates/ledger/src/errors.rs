//! Error types for the commitment ledger

use powstore_crypto::CommitError;
use powstore_files::GatewayError;
use powstore_time::{ClockError, TimestampMicros};
use powstore_types::{CommitmentId, SealedLocator};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("reveal time {reveal_at} is not after current time {now}")]
    InvalidSchedule {
        reveal_at: TimestampMicros,
        now: TimestampMicros,
    },

    #[error("commitment not found: {0}")]
    NotFound(CommitmentId),

    #[error("requester does not own commitment {0}")]
    NotOwner(CommitmentId),

    #[error("commitment {id} cannot be revealed for another {}s", remaining.as_secs())]
    TooEarly { id: CommitmentId, remaining: Duration },

    #[error("sealed content of commitment {id} is gone from the store ({locator})")]
    ContentNotFound {
        id: CommitmentId,
        locator: SealedLocator,
    },

    #[error("storage unavailable after {attempts} attempt(s): {reason}")]
    StorageUnavailable { attempts: u32, reason: String },

    #[error("commitment {id} is repudiated: {reason}")]
    TamperDetected { id: CommitmentId, reason: String },

    #[error(transparent)]
    ClockSkew(#[from] ClockError),

    #[error("ledger storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    pub(crate) fn from_gateway(id: CommitmentId, err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { locator } => LedgerError::ContentNotFound { id, locator },
            GatewayError::StorageUnavailable { attempts, reason } => {
                LedgerError::StorageUnavailable { attempts, reason }
            }
            GatewayError::TamperDetected(reason) => LedgerError::TamperDetected { id, reason },
            GatewayError::Seal(reason) => {
                LedgerError::Storage(anyhow::anyhow!("seal key rejected: {reason}"))
            }
        }
    }
}

impl From<CommitError> for LedgerError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::InvalidInput(msg) => LedgerError::InvalidInput(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
