use powstore_crypto::{SealKey, SealSecret};
use powstore_files::{
    DirContentStore, GatewayConfig, GatewayError, MemoryContentStore, StorageGateway,
};
use powstore_types::{Salt, SealedLocator};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fast_config() -> GatewayConfig {
    GatewayConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
        timeout_ms: 200,
    }
}

fn key() -> SealKey {
    SealKey::derive(&SealSecret::from_bytes([8u8; 32]), &Salt([9u8; 32]))
}

#[tokio::test]
async fn seal_upload_fetch_unseal() {
    let store = MemoryContentStore::new();
    let gateway = StorageGateway::new(Arc::new(store.clone()), fast_config());
    let key = key();

    let sealed = gateway.seal(b"the manuscript", &key).unwrap();
    assert!(!sealed
        .as_bytes()
        .windows(b"manuscript".len())
        .any(|w| w == b"manuscript"));

    let locator = gateway.upload(&sealed).await.unwrap();
    assert!(store.contains(locator.as_str()));

    let fetched = gateway.fetch(&locator).await.unwrap();
    assert_eq!(fetched, sealed);
    assert_eq!(gateway.unseal(&fetched, &key).unwrap(), b"the manuscript");
    assert_eq!(gateway.stats().unseal_calls(), 1);
}

#[tokio::test]
async fn transient_upload_failures_are_retried() {
    let store = MemoryContentStore::new();
    store.fail_next_puts(2);
    let gateway = StorageGateway::new(Arc::new(store.clone()), fast_config());

    let sealed = gateway.seal(b"retry me", &key()).unwrap();
    gateway.upload(&sealed).await.unwrap();
    assert_eq!(gateway.stats().upload_attempts(), 3);
    assert_eq!(store.put_calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_storage_unavailable() {
    let store = MemoryContentStore::new();
    store.fail_next_puts(10);
    let gateway = StorageGateway::new(Arc::new(store.clone()), fast_config());

    let sealed = gateway.seal(b"never lands", &key()).unwrap();
    let err = gateway.upload(&sealed).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::StorageUnavailable { attempts: 3, .. }
    ));
    assert!(store.is_empty());
}

#[tokio::test]
async fn slow_store_times_out() {
    let store = MemoryContentStore::new();
    store.set_latency(Some(Duration::from_millis(500)));
    let config = GatewayConfig {
        max_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
        timeout_ms: 20,
    };
    let gateway = StorageGateway::new(Arc::new(store), config);

    let err = gateway
        .fetch(&SealedLocator::new("0".repeat(64)))
        .await
        .unwrap_err();
    match err {
        GatewayError::StorageUnavailable { attempts, reason } => {
            assert_eq!(attempts, 2);
            assert!(reason.contains("timed out"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let store = MemoryContentStore::new();
    let gateway = StorageGateway::new(Arc::new(store.clone()), fast_config());
    let locator = SealedLocator::new("f".repeat(64));

    let err = gateway.fetch(&locator).await.unwrap_err();
    assert_eq!(err, GatewayError::NotFound { locator });
    assert_eq!(gateway.stats().fetch_attempts(), 1);
    assert_eq!(store.get_calls(), 1);
}

#[tokio::test]
async fn corrupted_blob_is_tamper_detected() {
    let store = MemoryContentStore::new();
    let gateway = StorageGateway::new(Arc::new(store.clone()), fast_config());
    let key = key();

    let sealed = gateway.seal(b"fragile", &key).unwrap();
    let locator = gateway.upload(&sealed).await.unwrap();
    assert!(store.corrupt(locator.as_str()));

    let fetched = gateway.fetch(&locator).await.unwrap();
    assert!(matches!(
        gateway.unseal(&fetched, &key),
        Err(GatewayError::TamperDetected(_))
    ));
}

#[tokio::test]
async fn seal_with_wrong_key_length_fails() {
    let gateway = StorageGateway::new(Arc::new(MemoryContentStore::new()), fast_config());
    assert!(matches!(
        gateway.seal_with_raw_key(b"data", &[1u8; 12]),
        Err(GatewayError::Seal(_))
    ));
}

#[tokio::test]
async fn directory_store_roundtrip_through_gateway() {
    let dir = TempDir::new().unwrap();
    let store = DirContentStore::open(dir.path()).unwrap();
    let gateway = StorageGateway::new(Arc::new(store), fast_config());
    let key = key();

    let sealed = gateway.seal(b"on disk", &key).unwrap();
    let locator = gateway.upload(&sealed).await.unwrap();
    let fetched = gateway.fetch(&locator).await.unwrap();
    assert_eq!(gateway.unseal(&fetched, &key).unwrap(), b"on disk");
}
