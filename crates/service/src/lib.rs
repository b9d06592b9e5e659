//! PowStore reveal service.
//!
//! Maps verified caller identities onto owners and exposes the commit,
//! reveal and public verification operations on top of the ledger.

pub mod config;
pub mod error;
pub mod identity;
pub mod service;

pub use config::{
    LedgerBackend, LedgerSection, PowStoreConfig, ServiceConfig, StoreBackend, StoreSection,
    DEFAULT_MAX_CONTENT_BYTES,
};
pub use error::{Result, ServiceError};
pub use identity::IdentityToken;
pub use service::{CommitmentReceipt, RevealService, RevealedContent};
