//! Service configuration and component wiring.

use anyhow::{bail, Context, Result};
use powstore_files::{
    ContentStore, DirContentStore, GatewayConfig, IpfsHttpStore, MemoryContentStore,
    StorageGateway,
};
use powstore_ledger::{
    CommitmentLedger, LedgerConfig, LedgerStore, MemoryLedgerStore, SledLedgerStore,
};
use powstore_time::RevealClock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::service::RevealService;

pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Upper bound on a single committed file.
    pub max_content_bytes: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub backend: LedgerBackend,
    pub path: PathBuf,
    pub expiry_grace_secs: u64,
    /// Backwards clock steps tolerated before reveals fail with clock skew.
    pub clock_skew_tolerance_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Sled,
            path: PathBuf::from("./data/ledger"),
            expiry_grace_secs: LedgerConfig::default().expiry_grace_secs,
            clock_skew_tolerance_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Dir,
    Ipfs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub dir: PathBuf,
    pub ipfs_api_url: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Dir,
            dir: PathBuf::from("./data/blobs"),
            ipfs_api_url: "http://127.0.0.1:5001".to_string(),
        }
    }
}

/// Top-level configuration, as loaded by the `powstore` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowStoreConfig {
    pub ledger: LedgerSection,
    pub store: StoreSection,
    pub gateway: GatewayConfig,
    pub service: ServiceConfig,
    pub log_level: String,
    pub log_format: String,
}

impl Default for PowStoreConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerSection::default(),
            store: StoreSection::default(),
            gateway: GatewayConfig::default(),
            service: ServiceConfig::default(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl PowStoreConfig {
    /// Everything in memory; nothing survives the process.
    pub fn ephemeral() -> Self {
        let mut config = Self::default();
        config.ledger.backend = LedgerBackend::Memory;
        config.store.backend = StoreBackend::Memory;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.max_attempts == 0 {
            bail!("gateway.max_attempts must be at least 1");
        }
        if self.gateway.timeout_ms == 0 {
            bail!("gateway.timeout_ms must be greater than zero");
        }
        if self.gateway.initial_backoff_ms > self.gateway.max_backoff_ms {
            bail!("gateway.initial_backoff_ms must not exceed gateway.max_backoff_ms");
        }
        if self.service.max_content_bytes == 0 {
            bail!("service.max_content_bytes must be greater than zero");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            bail!("log_format must be 'pretty' or 'json', got '{}'", self.log_format);
        }
        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            expiry_grace_secs: self.ledger.expiry_grace_secs,
        }
    }

    pub fn build_content_store(&self) -> Result<Arc<dyn ContentStore>> {
        let store: Arc<dyn ContentStore> = match self.store.backend {
            StoreBackend::Memory => Arc::new(MemoryContentStore::new()),
            StoreBackend::Dir => Arc::new(
                DirContentStore::open(&self.store.dir).with_context(|| {
                    format!("failed to open blob directory {}", self.store.dir.display())
                })?,
            ),
            StoreBackend::Ipfs => Arc::new(IpfsHttpStore::new(&self.store.ipfs_api_url)?),
        };
        Ok(store)
    }

    pub fn build_ledger_store(&self) -> Result<Arc<dyn LedgerStore>> {
        let store: Arc<dyn LedgerStore> = match self.ledger.backend {
            LedgerBackend::Memory => Arc::new(MemoryLedgerStore::new()),
            LedgerBackend::Sled => Arc::new(
                SledLedgerStore::open(&self.ledger.path).with_context(|| {
                    format!("failed to open ledger at {}", self.ledger.path.display())
                })?,
            ),
        };
        Ok(store)
    }

    /// Wire up a service on the system clock.
    pub fn build_service(&self) -> Result<RevealService> {
        self.build_service_with_clock(RevealClock::system())
    }

    pub fn build_service_with_clock(&self, clock: RevealClock) -> Result<RevealService> {
        self.validate()?;
        let gateway = StorageGateway::new(self.build_content_store()?, self.gateway.clone());
        let clock =
            clock.with_skew_tolerance(Duration::from_millis(self.ledger.clock_skew_tolerance_ms));
        let ledger = CommitmentLedger::new(
            self.build_ledger_store()?,
            gateway,
            clock,
            self.ledger_config(),
        );
        Ok(RevealService::new(Arc::new(ledger), self.service.clone()))
    }
}
