//! Directory-backed content-addressed store.
//!
//! Blobs live at `<root>/<blake3-hex>`. Writes go through a temporary file
//! and a rename so a crashed write never leaves a partial blob under a
//! valid locator.

use super::{blake3_locator, is_blake3_locator, ContentStore, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DirContentStore {
    root: PathBuf,
}

impl DirContentStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, locator: &str) -> PathBuf {
        self.root.join(locator)
    }
}

#[async_trait]
impl ContentStore for DirContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        let locator = blake3_locator(&bytes);
        let path = self.blob_path(&locator);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(locator);
        }

        let tmp = self.root.join(format!(".{locator}.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Unavailable(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("rename {}: {e}", path.display())))?;
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StoreError> {
        if !is_blake3_locator(locator) {
            tracing::warn!(locator, "rejecting malformed locator for directory store");
            return Err(StoreError::NotFound(locator.to_string()));
        }
        match tokio::fs::read(self.blob_path(locator)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(locator.to_string()))
            }
            Err(e) => Err(StoreError::Unavailable(format!("read {locator}: {e}"))),
        }
    }

    fn name(&self) -> &'static str {
        "dir"
    }
}
