//! Content-addressed store backends.

use async_trait::async_trait;
use thiserror::Error;

pub mod dir;
pub mod ipfs;
pub mod memory;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend has no content under this locator (never stored, or
    /// garbage-collected). Retrying cannot help.
    #[error("locator not found: {0}")]
    NotFound(String),

    /// Transport or backend failure; may succeed on retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// External content-addressed storage.
///
/// `put` returns a locator derived from the stored bytes; `get` returns the
/// exact bytes stored under that locator.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, StoreError>;

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StoreError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// BLAKE3 hex locator used by the local backends.
pub(crate) fn blake3_locator(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

pub(crate) fn is_blake3_locator(locator: &str) -> bool {
    locator.len() == 64 && locator.bytes().all(|b| b.is_ascii_hexdigit())
}
