//! In-memory content-addressed store (for testing and local runs).

use super::{blake3_locator, ContentStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<MemoryContentStoreInner>,
}

#[derive(Default)]
struct MemoryContentStoreInner {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicU32,
    fail_gets: AtomicU32,
    latency: RwLock<Option<Duration>>,
    put_calls: AtomicU64,
    get_calls: AtomicU64,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.inner.blobs.read().contains_key(locator)
    }

    /// Flip one byte of the stored blob. Returns `false` if absent.
    pub fn corrupt(&self, locator: &str) -> bool {
        let mut blobs = self.inner.blobs.write();
        match blobs.get_mut(locator) {
            Some(bytes) if !bytes.is_empty() => {
                let last = bytes.len() - 1;
                bytes[last] ^= 0x5a;
                true
            }
            _ => false,
        }
    }

    /// Replace the stored blob wholesale.
    pub fn overwrite(&self, locator: &str, bytes: Vec<u8>) {
        self.inner.blobs.write().insert(locator.to_string(), bytes);
    }

    /// Drop a blob, as an unpinned object being garbage-collected.
    pub fn collect_garbage(&self, locator: &str) -> bool {
        self.inner.blobs.write().remove(locator).is_some()
    }

    /// Make the next `n` puts fail with `Unavailable`.
    pub fn fail_next_puts(&self, n: u32) {
        self.inner.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` gets fail with `Unavailable`.
    pub fn fail_next_gets(&self, n: u32) {
        self.inner.fail_gets.store(n, Ordering::SeqCst);
    }

    /// Delay every call, to exercise gateway timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write() = latency;
    }

    pub fn put_calls(&self) -> u64 {
        self.inner.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u64 {
        self.inner.get_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        self.inner.put_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if take_failure(&self.inner.fail_puts) {
            return Err(StoreError::Unavailable("injected put failure".to_string()));
        }
        let locator = blake3_locator(&bytes);
        self.inner.blobs.write().insert(locator.clone(), bytes);
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if take_failure(&self.inner.fail_gets) {
            return Err(StoreError::Unavailable("injected get failure".to_string()));
        }
        self.inner
            .blobs
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(locator.to_string()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
