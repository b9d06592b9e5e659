//! Persistence backends for commitment records.

use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;
use powstore_types::{CommitmentId, CommitmentRecord, OwnerIdentity, PublicLogEntry};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Abstract ledger storage.
///
/// Every method that touches more than one logical table must be atomic:
/// either all writes land or none do.
pub trait LedgerStore: Send + Sync {
    /// Persist a brand-new record with its vault secret and append it to the
    /// public log. Fails if the id already exists.
    fn insert_new(&self, record: &CommitmentRecord, seal_secret: &[u8; 32])
        -> Result<PublicLogEntry>;

    fn get(&self, id: &CommitmentId) -> Result<Option<CommitmentRecord>>;

    /// Overwrite an existing record (state transitions only).
    fn update(&self, record: &CommitmentRecord) -> Result<()>;

    /// Persist the Revealed record together with the revealed plaintext.
    fn store_revealed(&self, record: &CommitmentRecord, plaintext: &[u8]) -> Result<()>;

    fn seal_secret(&self, id: &CommitmentId) -> Result<Option<[u8; 32]>>;

    fn revealed_content(&self, id: &CommitmentId) -> Result<Option<Vec<u8>>>;

    /// Records owned by `owner`, oldest first.
    fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<CommitmentRecord>>;

    fn public_log(&self) -> Result<Vec<PublicLogEntry>>;

    fn count(&self) -> Result<u64>;
}

/// In-memory testing backend
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: RwLock<MemoryLedgerInner>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    records: HashMap<CommitmentId, CommitmentRecord>,
    secrets: HashMap<CommitmentId, [u8; 32]>,
    revealed: HashMap<CommitmentId, Vec<u8>>,
    by_owner: HashMap<OwnerIdentity, Vec<CommitmentId>>,
    log: Vec<PublicLogEntry>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn insert_new(
        &self,
        record: &CommitmentRecord,
        seal_secret: &[u8; 32],
    ) -> Result<PublicLogEntry> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.id) {
            bail!("commitment {} already exists", record.id);
        }
        let entry = PublicLogEntry::next(
            inner.log.last(),
            record.id,
            record.digest,
            record.created_at,
            record.reveal_at,
        );
        inner.records.insert(record.id, record.clone());
        inner.secrets.insert(record.id, *seal_secret);
        inner.by_owner.entry(record.owner).or_default().push(record.id);
        inner.log.push(entry.clone());
        Ok(entry)
    }

    fn get(&self, id: &CommitmentId) -> Result<Option<CommitmentRecord>> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    fn update(&self, record: &CommitmentRecord) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(anyhow!("commitment {} does not exist", record.id)),
        }
    }

    fn store_revealed(&self, record: &CommitmentRecord, plaintext: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.records.contains_key(&record.id) {
            bail!("commitment {} does not exist", record.id);
        }
        inner.records.insert(record.id, record.clone());
        inner.revealed.insert(record.id, plaintext.to_vec());
        Ok(())
    }

    fn seal_secret(&self, id: &CommitmentId) -> Result<Option<[u8; 32]>> {
        Ok(self.inner.read().secrets.get(id).copied())
    }

    fn revealed_content(&self, id: &CommitmentId) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().revealed.get(id).cloned())
    }

    fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<CommitmentRecord>> {
        let inner = self.inner.read();
        let mut records: Vec<CommitmentRecord> = inner
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| inner.records.get(id).cloned()).collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn public_log(&self) -> Result<Vec<PublicLogEntry>> {
        Ok(self.inner.read().log.clone())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.inner.read().records.len() as u64)
    }
}

const LOG_HEAD_KEY: &[u8] = b"public_log_head";

/// Sled-backed implementation
pub struct SledLedgerStore {
    db: Db,
    commitments: Tree,
    seal_keys: Tree,
    revealed: Tree,
    owner_index: Tree,
    public_log: Tree,
    metadata: Tree,
}

impl SledLedgerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            commitments: db.open_tree("commitments")?,
            seal_keys: db.open_tree("seal_keys")?,
            revealed: db.open_tree("revealed")?,
            owner_index: db.open_tree("owner_index")?,
            public_log: db.open_tree("public_log")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn owner_index_key(owner: &OwnerIdentity, id: &CommitmentId) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(owner.as_bytes());
    key[32..].copy_from_slice(id.as_bytes());
    key
}

fn abort<E: std::fmt::Display>(e: E) -> ConflictableTransactionError<String> {
    ConflictableTransactionError::Abort(e.to_string())
}

fn flatten_tx<T>(res: std::result::Result<T, TransactionError<String>>) -> Result<T> {
    match res {
        Ok(v) => Ok(v),
        Err(TransactionError::Abort(msg)) => Err(anyhow!(msg)),
        Err(TransactionError::Storage(e)) => Err(e.into()),
    }
}

impl LedgerStore for SledLedgerStore {
    fn insert_new(
        &self,
        record: &CommitmentRecord,
        seal_secret: &[u8; 32],
    ) -> Result<PublicLogEntry> {
        let record_bytes = serde_json::to_vec(record)?;
        let id_key = *record.id.as_bytes();
        let owner_key = owner_index_key(&record.owner, &record.id);

        let res = (
            &self.commitments,
            &self.seal_keys,
            &self.owner_index,
            &self.public_log,
            &self.metadata,
        )
            .transaction(|(commitments, seal_keys, owner_index, public_log, metadata)| {
                if commitments.get(id_key)?.is_some() {
                    return Err(abort(format!("commitment {} already exists", record.id)));
                }
                let head: Option<PublicLogEntry> = match metadata.get(LOG_HEAD_KEY)? {
                    Some(bytes) => Some(serde_json::from_slice(&bytes).map_err(abort)?),
                    None => None,
                };
                let entry = PublicLogEntry::next(
                    head.as_ref(),
                    record.id,
                    record.digest,
                    record.created_at,
                    record.reveal_at,
                );
                let entry_bytes = serde_json::to_vec(&entry).map_err(abort)?;

                commitments.insert(&id_key[..], record_bytes.as_slice())?;
                seal_keys.insert(&id_key[..], &seal_secret[..])?;
                owner_index.insert(&owner_key[..], Vec::<u8>::new())?;
                public_log.insert(&entry.sequence.to_be_bytes()[..], entry_bytes.as_slice())?;
                metadata.insert(LOG_HEAD_KEY, entry_bytes.as_slice())?;
                Ok(entry)
            });
        let entry = flatten_tx(res)?;
        Ok(committed(entry, self.db.flush(), "insert"))
    }

    fn get(&self, id: &CommitmentId) -> Result<Option<CommitmentRecord>> {
        self.commitments
            .get(id.as_bytes())?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn update(&self, record: &CommitmentRecord) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        let id_key = *record.id.as_bytes();
        let res = self.commitments.transaction(|commitments| {
            if commitments.get(id_key)?.is_none() {
                return Err(abort(format!("commitment {} does not exist", record.id)));
            }
            commitments.insert(&id_key[..], data.as_slice())?;
            Ok(())
        });
        flatten_tx(res)?;
        Ok(committed((), self.db.flush(), "update"))
    }

    fn store_revealed(&self, record: &CommitmentRecord, plaintext: &[u8]) -> Result<()> {
        let data = serde_json::to_vec(record)?;
        let id_key = *record.id.as_bytes();
        let res = (&self.commitments, &self.revealed).transaction(|(commitments, revealed)| {
            if commitments.get(id_key)?.is_none() {
                return Err(abort(format!("commitment {} does not exist", record.id)));
            }
            commitments.insert(&id_key[..], data.as_slice())?;
            revealed.insert(&id_key[..], plaintext)?;
            Ok(())
        });
        flatten_tx(res)?;
        Ok(committed((), self.db.flush(), "reveal"))
    }

    fn seal_secret(&self, id: &CommitmentId) -> Result<Option<[u8; 32]>> {
        match self.seal_keys.get(id.as_bytes())? {
            Some(v) => {
                let bytes: [u8; 32] = v
                    .as_ref()
                    .try_into()
                    .map_err(|_| anyhow!("vault entry for {id} has {} bytes", v.len()))?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn revealed_content(&self, id: &CommitmentId) -> Result<Option<Vec<u8>>> {
        Ok(self.revealed.get(id.as_bytes())?.map(|v| v.to_vec()))
    }

    fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<CommitmentRecord>> {
        let mut records = Vec::new();
        for item in self.owner_index.scan_prefix(owner.as_bytes()) {
            let (key, _) = item?;
            let mut id = [0u8; 32];
            id.copy_from_slice(&key[32..64]);
            if let Some(record) = self.get(&CommitmentId(id))? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn public_log(&self) -> Result<Vec<PublicLogEntry>> {
        self.public_log
            .iter()
            .map(|r| {
                let (_, v) = r?;
                Ok(serde_json::from_slice::<PublicLogEntry>(&v)?)
            })
            .collect()
    }

    fn count(&self) -> Result<u64> {
        Ok(self.commitments.len() as u64)
    }
}

/// A failed flush after an applied transaction is logged, not returned.
fn committed<T>(value: T, flush: sled::Result<usize>, op: &str) -> T {
    if let Err(e) = flush {
        warn!(op, error = %e, "ledger flush after commit failed");
    }
    value
}
