use powstore_types::SealedLocator;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("seal failed: {0}")]
    Seal(String),

    #[error("storage unavailable after {attempts} attempt(s): {reason}")]
    StorageUnavailable { attempts: u32, reason: String },

    #[error("sealed content not found at {locator}")]
    NotFound { locator: SealedLocator },

    #[error("tamper detected: {0}")]
    TamperDetected(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
