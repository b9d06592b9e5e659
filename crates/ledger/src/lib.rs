//! PowStore commitment ledger.
//!
//! Owns commitment records, the sealing-key vault and the hash-chained public
//! log, and drives the one-way reveal state machine.

pub mod errors;
pub mod ledger;
pub mod store;

pub use errors::{LedgerError, Result};
pub use ledger::{CommitmentLedger, LedgerConfig, NewCommitment, RevealOutcome};
pub use store::{LedgerStore, MemoryLedgerStore, SledLedgerStore};
