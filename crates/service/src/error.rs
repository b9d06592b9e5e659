//! Caller-facing errors.

use powstore_crypto::CommitError;
use powstore_files::GatewayError;
use powstore_ledger::LedgerError;
use powstore_time::{ClockError, TimestampMicros};
use powstore_types::{CommitmentId, SealedLocator};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("reveal time {reveal_at} must be later than now ({now})")]
    InvalidSchedule {
        reveal_at: TimestampMicros,
        now: TimestampMicros,
    },

    #[error("commitment {0} does not exist")]
    NotFound(CommitmentId),

    #[error("only the owner may reveal commitment {0}")]
    NotOwner(CommitmentId),

    #[error("commitment {id} is still sealed; try again in {}s", remaining.as_secs())]
    TooEarly { id: CommitmentId, remaining: Duration },

    #[error("sealed content for commitment {id} is no longer available at {locator}")]
    ContentNotFound {
        id: CommitmentId,
        locator: SealedLocator,
    },

    #[error("content store unavailable after {attempts} attempt(s): {reason}")]
    StorageUnavailable { attempts: u32, reason: String },

    #[error("tamper detected: commitment {id} is permanently repudiated ({reason})")]
    TamperDetected { id: CommitmentId, reason: String },

    #[error("trusted clock unavailable: {0}")]
    ClockSkew(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidSchedule { .. } => "invalid_schedule",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::NotOwner(_) => "not_owner",
            ServiceError::TooEarly { .. } => "too_early",
            ServiceError::ContentNotFound { .. } => "content_not_found",
            ServiceError::StorageUnavailable { .. } => "storage_unavailable",
            ServiceError::TamperDetected { .. } => "tamper_detected",
            ServiceError::ClockSkew(_) => "clock_skew",
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Whether the same call may succeed later without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::TooEarly { .. }
                | ServiceError::StorageUnavailable { .. }
                | ServiceError::ClockSkew(_)
        )
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            LedgerError::InvalidSchedule { reveal_at, now } => {
                ServiceError::InvalidSchedule { reveal_at, now }
            }
            LedgerError::NotFound(id) => ServiceError::NotFound(id),
            LedgerError::NotOwner(id) => ServiceError::NotOwner(id),
            LedgerError::TooEarly { id, remaining } => ServiceError::TooEarly { id, remaining },
            LedgerError::ContentNotFound { id, locator } => {
                ServiceError::ContentNotFound { id, locator }
            }
            LedgerError::StorageUnavailable { attempts, reason } => {
                ServiceError::StorageUnavailable { attempts, reason }
            }
            LedgerError::TamperDetected { id, reason } => {
                ServiceError::TamperDetected { id, reason }
            }
            LedgerError::ClockSkew(e) => ServiceError::ClockSkew(e.to_string()),
            LedgerError::Storage(e) => ServiceError::Internal(format!("{e:#}")),
        }
    }
}

impl From<ClockError> for ServiceError {
    fn from(err: ClockError) -> Self {
        ServiceError::ClockSkew(err.to_string())
    }
}

/// Gateway failures outside a reveal, i.e. while sealing or uploading.
impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::StorageUnavailable { attempts, reason } => {
                ServiceError::StorageUnavailable { attempts, reason }
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<CommitError> for ServiceError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
