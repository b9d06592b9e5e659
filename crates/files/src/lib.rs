//! PowStore Storage Gateway
//!
//! Seals file content with authenticated encryption, hands the sealed bytes
//! to a content-addressed store and brings them back at reveal time.
//! Nothing here is persisted locally; the store is the only durable side.

pub mod envelope;
pub mod error;
pub mod gateway;
pub mod store;

pub use envelope::{SealedBlob, ENVELOPE_MAGIC};
pub use error::GatewayError;
pub use gateway::{GatewayConfig, GatewayStats, StorageGateway};
pub use store::dir::DirContentStore;
pub use store::ipfs::IpfsHttpStore;
pub use store::memory::MemoryContentStore;
pub use store::{ContentStore, StoreError};
