//! Storage gateway: seal/unseal plus retried, time-bounded store access.

use crate::envelope::{self, SealedBlob};
use crate::error::{GatewayError, Result};
use crate::store::{ContentStore, StoreError};
use powstore_crypto::SealKey;
use powstore_types::SealedLocator;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retry and timeout settings for calls to the external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// Backoff before retry number `retry` (0-based): `initial * 2^retry`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Call counters, shared across gateway clones.
#[derive(Debug, Default)]
pub struct GatewayStats {
    pub upload_calls: AtomicU64,
    pub upload_attempts: AtomicU64,
    pub fetch_calls: AtomicU64,
    pub fetch_attempts: AtomicU64,
    pub seal_calls: AtomicU64,
    pub unseal_calls: AtomicU64,
}

impl GatewayStats {
    pub fn unseal_calls(&self) -> u64 {
        self.unseal_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u64 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn upload_attempts(&self) -> u64 {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    pub fn fetch_attempts(&self) -> u64 {
        self.fetch_attempts.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ContentStore>,
    config: GatewayConfig,
    stats: Arc<GatewayStats>,
}

impl std::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageGateway")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ContentStore>, config: GatewayConfig) -> Self {
        Self {
            store,
            config,
            stats: Arc::new(GatewayStats::default()),
        }
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Authenticated encryption of `plaintext` under a derived seal key.
    pub fn seal(&self, plaintext: &[u8], key: &SealKey) -> Result<SealedBlob> {
        self.seal_with_raw_key(plaintext, key.expose())
    }

    /// Like [`seal`](Self::seal) for raw key bytes; a key that is not 32
    /// bytes long fails with `Seal`.
    pub fn seal_with_raw_key(&self, plaintext: &[u8], key: &[u8]) -> Result<SealedBlob> {
        self.stats.seal_calls.fetch_add(1, Ordering::SeqCst);
        envelope::seal(plaintext, key)
    }

    /// Decrypt and authenticate. Tampering yields `TamperDetected` and no bytes.
    pub fn unseal(&self, sealed: &SealedBlob, key: &SealKey) -> Result<Vec<u8>> {
        self.unseal_with_raw_key(sealed, key.expose())
    }

    pub fn unseal_with_raw_key(&self, sealed: &SealedBlob, key: &[u8]) -> Result<Vec<u8>> {
        self.stats.unseal_calls.fetch_add(1, Ordering::SeqCst);
        envelope::unseal(sealed, key)
    }

    pub async fn upload(&self, sealed: &SealedBlob) -> Result<SealedLocator> {
        self.stats.upload_calls.fetch_add(1, Ordering::SeqCst);
        let store = self.store.clone();
        let bytes = sealed.as_bytes().to_vec();
        let locator = self
            .with_retry("upload", &self.stats.upload_attempts, None, || {
                let store = store.clone();
                let bytes = bytes.clone();
                async move { store.put(bytes).await }
            })
            .await?;
        tracing::debug!(store = self.store.name(), %locator, size = sealed.len(), "sealed blob uploaded");
        Ok(SealedLocator(locator))
    }

    pub async fn fetch(&self, locator: &SealedLocator) -> Result<SealedBlob> {
        self.stats.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let store = self.store.clone();
        let key = locator.as_str().to_string();
        let bytes = self
            .with_retry("fetch", &self.stats.fetch_attempts, Some(locator), || {
                let store = store.clone();
                let key = key.clone();
                async move { store.get(&key).await }
            })
            .await?;
        Ok(SealedBlob::from_bytes(bytes))
    }

    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        attempts_counter: &AtomicU64,
        locator: Option<&SealedLocator>,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            attempts_counter.fetch_add(1, Ordering::SeqCst);
            let outcome = tokio::time::timeout(self.config.timeout(), call()).await;
            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(StoreError::NotFound(missing))) => {
                    let locator = locator
                        .cloned()
                        .unwrap_or_else(|| SealedLocator::new(missing));
                    return Err(GatewayError::NotFound { locator });
                }
                Ok(Err(StoreError::Unavailable(reason))) => last_reason = reason,
                Err(_) => {
                    last_reason = format!("timed out after {}ms", self.config.timeout_ms);
                }
            }

            if attempt < max_attempts {
                let delay = self.config.backoff(attempt - 1);
                tracing::warn!(
                    op,
                    store = self.store.name(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %last_reason,
                    "store call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(op, store = self.store.name(), max_attempts, reason = %last_reason, "store call failed, giving up");
        Err(GatewayError::StorageUnavailable {
            attempts: max_attempts,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = GatewayConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            timeout_ms: 1_000,
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(350));
        assert_eq!(config.backoff(40), Duration::from_millis(350));
    }
}
