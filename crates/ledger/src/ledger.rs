//! Commitment ledger: the reveal state machine.
//!
//! ```text
//! Pending ──reveal ok──────────────▶ Revealed   (terminal)
//!    │
//!    └──tag/digest mismatch────────▶ Repudiated (terminal)
//! ```
//!
//! `Expired` is only ever a view of a Pending record. Each commitment's
//! transitions run under its own async mutex, taken from a lock arena keyed
//! by id, so unrelated commitments never wait on each other.

use crate::errors::{LedgerError, Result};
use crate::store::LedgerStore;
use parking_lot::Mutex;
use powstore_crypto::{ContentCommitter, SealSecret};
use powstore_files::{GatewayError, StorageGateway};
use powstore_time::{RevealClock, TimestampMicros};
use powstore_types::{
    CommitmentId, CommitmentRecord, CommitmentState, CommitmentView, Digest, OwnerIdentity,
    PublicLogEntry, Salt, SealKeyRef, SealedLocator,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long after `reveal_at` an unrevealed commitment still reads as
    /// Pending before it is reported as Expired.
    pub expiry_grace_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            expiry_grace_secs: 0,
        }
    }
}

impl LedgerConfig {
    pub fn expiry_grace(&self) -> Duration {
        Duration::from_secs(self.expiry_grace_secs)
    }
}

/// Everything needed to persist a new commitment.
#[derive(Debug)]
pub struct NewCommitment {
    pub owner: OwnerIdentity,
    pub digest: Digest,
    pub salt: Salt,
    pub sealed_locator: SealedLocator,
    pub seal_secret: SealSecret,
    pub content_len: u64,
    pub reveal_at: TimestampMicros,
}

/// Result of a successful reveal.
#[derive(Debug, Clone)]
pub struct RevealOutcome {
    pub content: Arc<Vec<u8>>,
    pub view: CommitmentView,
}

pub struct CommitmentLedger {
    store: Arc<dyn LedgerStore>,
    gateway: StorageGateway,
    clock: RevealClock,
    committer: ContentCommitter,
    config: LedgerConfig,
    locks: Mutex<HashMap<CommitmentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl CommitmentLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: StorageGateway,
        clock: RevealClock,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            committer: ContentCommitter::new(),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    pub fn clock(&self) -> &RevealClock {
        &self.clock
    }

    /// Persist a new Pending commitment. Rejects reveal times not strictly
    /// in the future; nothing is written in that case.
    pub fn create(&self, new: NewCommitment) -> Result<CommitmentRecord> {
        let now = self.clock.now()?;
        if new.reveal_at <= now {
            return Err(LedgerError::InvalidSchedule {
                reveal_at: new.reveal_at,
                now,
            });
        }

        let id = CommitmentId::derive(now, &new.digest, &new.owner);
        let record = CommitmentRecord {
            id,
            owner: new.owner,
            digest: new.digest,
            salt: new.salt,
            sealed_locator: new.sealed_locator,
            seal_key_ref: SealKeyRef::for_commitment(&id),
            content_len: new.content_len,
            created_at: now,
            reveal_at: new.reveal_at,
            state: CommitmentState::Pending,
            revealed_at: None,
            repudiation: None,
        };

        let entry = self
            .store
            .insert_new(&record, new.seal_secret.expose())?;
        info!(
            commitment = %id,
            digest = %record.digest,
            reveal_at = record.reveal_at.as_micros(),
            log_sequence = entry.sequence,
            "commitment created"
        );
        Ok(record)
    }

    /// Owner-only reveal. Exactly one fetch+unseal ever happens per
    /// commitment; later calls are served from the stored outcome.
    pub async fn reveal(&self, id: &CommitmentId, requester: &OwnerIdentity) -> Result<RevealOutcome> {
        let slot = self.lock_slot(id);
        let _guard = slot.lock.lock().await;
        self.reveal_locked(id, requester).await
    }

    async fn reveal_locked(
        &self,
        id: &CommitmentId,
        requester: &OwnerIdentity,
    ) -> Result<RevealOutcome> {
        let mut record = self.load(id)?;
        if record.owner != *requester {
            warn!(commitment = %id, "reveal requested by non-owner");
            return Err(LedgerError::NotOwner(*id));
        }

        match record.state {
            CommitmentState::Revealed => return self.stored_outcome(&record),
            CommitmentState::Repudiated => {
                return Err(LedgerError::TamperDetected {
                    id: *id,
                    reason: record
                        .repudiation
                        .clone()
                        .unwrap_or_else(|| "previously repudiated".to_string()),
                })
            }
            CommitmentState::Pending | CommitmentState::Expired => {}
        }

        let now = self.clock.now()?;
        if !RevealClock::is_eligible(record.reveal_at, now) {
            return Err(LedgerError::TooEarly {
                id: *id,
                remaining: RevealClock::remaining(record.reveal_at, now),
            });
        }

        let secret = self
            .store
            .seal_secret(id)?
            .map(SealSecret::from_bytes)
            .ok_or_else(|| {
                LedgerError::Storage(anyhow::anyhow!("vault has no key for {}", record.seal_key_ref.as_str()))
            })?;

        // Store failures leave the record untouched.
        let sealed = self
            .gateway
            .fetch(&record.sealed_locator)
            .await
            .map_err(|e| LedgerError::from_gateway(*id, e))?;

        let key = self.committer.derive_seal_key(&secret, &record.salt);
        let plaintext = match self.gateway.unseal(&sealed, &key) {
            Ok(bytes) => bytes,
            Err(GatewayError::TamperDetected(reason)) => {
                return Err(self.repudiate(record, reason));
            }
            Err(other) => return Err(LedgerError::from_gateway(*id, other)),
        };

        let matches = self
            .committer
            .verify_salted(&plaintext, &record.salt, &record.digest)
            .unwrap_or(false);
        if !matches {
            return Err(self.repudiate(
                record,
                "revealed content does not match the committed digest".to_string(),
            ));
        }

        record.state = CommitmentState::Revealed;
        record.revealed_at = Some(now);
        self.store.store_revealed(&record, &plaintext)?;

        let content = Arc::new(plaintext);
        info!(commitment = %id, bytes = content.len(), "commitment revealed");

        Ok(RevealOutcome {
            content,
            view: record.view(now, self.config.expiry_grace()),
        })
    }

    fn stored_outcome(&self, record: &CommitmentRecord) -> Result<RevealOutcome> {
        let bytes = self.store.revealed_content(&record.id)?.ok_or_else(|| {
            LedgerError::Storage(anyhow::anyhow!(
                "revealed content for {} missing from ledger",
                record.id
            ))
        })?;
        let content = Arc::new(bytes);
        let now = self.clock.now()?;
        Ok(RevealOutcome {
            content,
            view: record.view(now, self.config.expiry_grace()),
        })
    }

    /// Always reports the tamper finding. A failed write leaves the record
    /// Pending, so the next reveal re-checks the blob and repudiates again.
    fn repudiate(&self, mut record: CommitmentRecord, reason: String) -> LedgerError {
        let id = record.id;
        error!(commitment = %id, %reason, "tamper detected, commitment repudiated");
        record.state = CommitmentState::Repudiated;
        record.repudiation = Some(reason.clone());
        if let Err(e) = self.store.update(&record) {
            error!(commitment = %id, error = %e, "failed to persist repudiation");
            return LedgerError::TamperDetected {
                id,
                reason: format!("{reason} (repudiation not persisted: {e})"),
            };
        }
        LedgerError::TamperDetected { id, reason }
    }

    /// Third-party check of `claimed` against the published digest. Needs
    /// the salt, which is only disclosed by a successful reveal.
    pub fn verify_externally(&self, id: &CommitmentId, claimed: &[u8]) -> Result<bool> {
        let record = self.load(id)?;
        match record.state {
            CommitmentState::Revealed => {
                if claimed.is_empty() {
                    return Ok(false);
                }
                Ok(self
                    .committer
                    .verify_salted(claimed, &record.salt, &record.digest)?)
            }
            CommitmentState::Repudiated => Ok(false),
            CommitmentState::Pending | CommitmentState::Expired => {
                let now = self.clock.now()?;
                Err(LedgerError::TooEarly {
                    id: *id,
                    remaining: RevealClock::remaining(record.reveal_at, now),
                })
            }
        }
    }

    pub fn get(&self, id: &CommitmentId) -> Result<CommitmentView> {
        let record = self.load(id)?;
        let now = self.clock.now()?;
        Ok(record.view(now, self.config.expiry_grace()))
    }

    pub fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<CommitmentView>> {
        let now = self.clock.now()?;
        let grace = self.config.expiry_grace();
        Ok(self
            .store
            .list_by_owner(owner)?
            .iter()
            .map(|r| r.view(now, grace))
            .collect())
    }

    pub fn public_log(&self) -> Result<Vec<PublicLogEntry>> {
        Ok(self.store.public_log()?)
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.store.count()?)
    }

    fn load(&self, id: &CommitmentId) -> Result<CommitmentRecord> {
        self.store.get(id)?.ok_or(LedgerError::NotFound(*id))
    }

    fn lock_slot(&self, id: &CommitmentId) -> LockSlot<'_> {
        let lock = self
            .locks
            .lock()
            .entry(*id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        LockSlot {
            arena: &self.locks,
            id: *id,
            lock,
        }
    }

    #[cfg(test)]
    pub(crate) fn arena_len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// A borrowed entry of the lock arena. Dropping it, including when the
/// owning future is cancelled, removes the entry once nobody else holds it.
struct LockSlot<'a> {
    arena: &'a Mutex<HashMap<CommitmentId, Arc<tokio::sync::Mutex<()>>>>,
    id: CommitmentId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.arena.lock();
        // One reference in the arena, one held here.
        if Arc::strong_count(&self.lock) == 2
            && locks
                .get(&self.id)
                .is_some_and(|held| Arc::ptr_eq(held, &self.lock))
        {
            locks.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use powstore_files::{GatewayConfig, MemoryContentStore};
    use powstore_time::ManualTimeSource;

    struct Fixture {
        ledger: CommitmentLedger,
        store: MemoryContentStore,
        time: ManualTimeSource,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryLedgerStore::new()))
    }

    fn fixture_with(records: Arc<dyn LedgerStore>) -> Fixture {
        let store = MemoryContentStore::new();
        let time = ManualTimeSource::new(TimestampMicros::from_secs(1_700_000_000));
        let gateway = StorageGateway::new(
            Arc::new(store.clone()),
            GatewayConfig {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
                timeout_ms: 500,
            },
        );
        let ledger = CommitmentLedger::new(
            records,
            gateway,
            RevealClock::new(Arc::new(time.clone())),
            LedgerConfig::default(),
        );
        Fixture {
            ledger,
            store,
            time,
        }
    }

    /// Delegates everything except `update`, which always fails.
    struct ReadOnlyUpdates(MemoryLedgerStore);

    impl LedgerStore for ReadOnlyUpdates {
        fn insert_new(
            &self,
            record: &CommitmentRecord,
            seal_secret: &[u8; 32],
        ) -> anyhow::Result<PublicLogEntry> {
            self.0.insert_new(record, seal_secret)
        }
        fn get(&self, id: &CommitmentId) -> anyhow::Result<Option<CommitmentRecord>> {
            self.0.get(id)
        }
        fn update(&self, _record: &CommitmentRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        fn store_revealed(&self, record: &CommitmentRecord, plaintext: &[u8]) -> anyhow::Result<()> {
            self.0.store_revealed(record, plaintext)
        }
        fn seal_secret(&self, id: &CommitmentId) -> anyhow::Result<Option<[u8; 32]>> {
            self.0.seal_secret(id)
        }
        fn revealed_content(&self, id: &CommitmentId) -> anyhow::Result<Option<Vec<u8>>> {
            self.0.revealed_content(id)
        }
        fn list_by_owner(&self, owner: &OwnerIdentity) -> anyhow::Result<Vec<CommitmentRecord>> {
            self.0.list_by_owner(owner)
        }
        fn public_log(&self) -> anyhow::Result<Vec<PublicLogEntry>> {
            self.0.public_log()
        }
        fn count(&self) -> anyhow::Result<u64> {
            self.0.count()
        }
    }

    async fn commit(fx: &Fixture, owner: OwnerIdentity, content: &[u8], delay: Duration) -> CommitmentRecord {
        let salt = ContentCommitter::generate_salt();
        let secret = SealSecret::generate();
        let committer = ContentCommitter::new();
        let digest = committer.commit_salted(content, &salt).unwrap();
        let key = committer.derive_seal_key(&secret, &salt);
        let sealed = fx.ledger.gateway().seal(content, &key).unwrap();
        let locator = fx.ledger.gateway().upload(&sealed).await.unwrap();
        fx.ledger
            .create(NewCommitment {
                owner,
                digest,
                salt,
                sealed_locator: locator,
                seal_secret: secret,
                content_len: content.len() as u64,
                reveal_at: fx.time.current().saturating_add(delay),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn create_rejects_past_and_present_schedules() {
        let fx = fixture();
        let now = fx.time.current();
        for reveal_at in [now, now.saturating_sub(Duration::from_secs(1))] {
            let err = fx
                .ledger
                .create(NewCommitment {
                    owner: OwnerIdentity([1u8; 32]),
                    digest: Digest([2u8; 32]),
                    salt: Salt([3u8; 32]),
                    sealed_locator: SealedLocator::new("x"),
                    seal_secret: SealSecret::generate(),
                    content_len: 1,
                    reveal_at,
                })
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidSchedule { .. }));
        }
        assert_eq!(fx.ledger.count().unwrap(), 0);
        assert!(fx.ledger.public_log().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_owner_cannot_reveal() {
        let fx = fixture();
        let record = commit(&fx, OwnerIdentity([1u8; 32]), b"mine", Duration::from_secs(5)).await;
        fx.time.advance(Duration::from_secs(10));
        let err = fx
            .ledger
            .reveal(&record.id, &OwnerIdentity([9u8; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner(_)));
        assert_eq!(fx.ledger.gateway().stats().fetch_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_commitment_is_not_found() {
        let fx = fixture();
        let err = fx
            .ledger
            .reveal(&CommitmentId([4u8; 32]), &OwnerIdentity([1u8; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn lock_arena_is_emptied_after_reveal() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"tidy", Duration::from_secs(1)).await;
        fx.time.advance(Duration::from_secs(2));
        fx.ledger.reveal(&record.id, &owner).await.unwrap();
        assert_eq!(fx.ledger.arena_len(), 0);
    }

    #[tokio::test]
    async fn garbage_collected_content_leaves_record_pending() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"ephemeral", Duration::from_secs(1)).await;
        assert!(fx.store.collect_garbage(record.sealed_locator.as_str()));
        fx.time.advance(Duration::from_secs(2));

        let err = fx.ledger.reveal(&record.id, &owner).await.unwrap_err();
        assert!(matches!(err, LedgerError::ContentNotFound { .. }));
        let view = fx.ledger.get(&record.id).unwrap();
        assert_eq!(view.state, CommitmentState::Expired);
        assert_eq!(fx.ledger.gateway().stats().unseal_calls(), 0);
    }

    #[tokio::test]
    async fn transient_outage_leaves_record_unchanged_and_retry_succeeds() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"patience", Duration::from_secs(1)).await;
        fx.time.advance(Duration::from_secs(2));

        fx.store.fail_next_gets(5);
        let err = fx.ledger.reveal(&record.id, &owner).await.unwrap_err();
        assert!(matches!(err, LedgerError::StorageUnavailable { attempts: 2, .. }));

        fx.store.fail_next_gets(0);
        let outcome = fx.ledger.reveal(&record.id, &owner).await.unwrap();
        assert_eq!(outcome.content.as_slice(), b"patience");
    }

    #[tokio::test]
    async fn substituted_content_with_valid_seal_is_repudiated() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"original", Duration::from_secs(1)).await;

        // Re-seal different bytes under the real key: the tag verifies but
        // the digest does not.
        let secret = SealSecret::from_bytes(
            fx.ledger.store.seal_secret(&record.id).unwrap().unwrap(),
        );
        let key = ContentCommitter::new().derive_seal_key(&secret, &record.salt);
        let forged = fx.ledger.gateway().seal(b"forgery", &key).unwrap();
        fx.store
            .overwrite(record.sealed_locator.as_str(), forged.into_bytes());

        fx.time.advance(Duration::from_secs(2));
        let err = fx.ledger.reveal(&record.id, &owner).await.unwrap_err();
        match err {
            LedgerError::TamperDetected { reason, .. } => {
                assert!(reason.contains("does not match"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            fx.ledger.get(&record.id).unwrap().state,
            CommitmentState::Repudiated
        );
        assert!(!fx.ledger.verify_externally(&record.id, b"original").unwrap());
    }

    #[tokio::test]
    async fn verify_externally_waits_for_disclosure() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"claim", Duration::from_secs(100)).await;

        let err = fx.ledger.verify_externally(&record.id, b"claim").unwrap_err();
        match err {
            LedgerError::TooEarly { remaining, .. } => {
                assert_eq!(remaining, Duration::from_secs(100))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        fx.time.advance(Duration::from_secs(100));
        fx.ledger.reveal(&record.id, &owner).await.unwrap();
        assert!(fx.ledger.verify_externally(&record.id, b"claim").unwrap());
        assert!(!fx.ledger.verify_externally(&record.id, b"claim!").unwrap());
        assert!(!fx.ledger.verify_externally(&record.id, b"").unwrap());
    }

    #[tokio::test]
    async fn clock_rollback_fails_reveal_without_state_change() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"timely", Duration::from_secs(10)).await;
        fx.time.advance(Duration::from_secs(20));
        fx.ledger.get(&record.id).unwrap();

        fx.time.set(TimestampMicros::from_secs(1_600_000_000));
        let err = fx.ledger.reveal(&record.id, &owner).await.unwrap_err();
        assert!(matches!(err, LedgerError::ClockSkew(_)));

        fx.time.set(record.reveal_at.saturating_add(Duration::from_secs(30)));
        let view = fx.ledger.get(&record.id).unwrap();
        assert_eq!(view.state, CommitmentState::Expired);
    }

    #[tokio::test]
    async fn tamper_is_reported_even_when_repudiation_cannot_be_stored() {
        let fx = fixture_with(Arc::new(ReadOnlyUpdates(MemoryLedgerStore::new())));
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"fragile", Duration::from_secs(1)).await;
        assert!(fx.store.corrupt(record.sealed_locator.as_str()));
        fx.time.advance(Duration::from_secs(2));

        for _ in 0..2 {
            let err = fx.ledger.reveal(&record.id, &owner).await.unwrap_err();
            match err {
                LedgerError::TamperDetected { id, reason } => {
                    assert_eq!(id, record.id);
                    assert!(reason.contains("not persisted"));
                    assert!(reason.contains("disk full"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        // The write failed, so the record was never marked Repudiated.
        assert_eq!(fx.ledger.get(&record.id).unwrap().state, CommitmentState::Expired);
    }

    #[tokio::test]
    async fn cancelled_reveal_releases_its_lock_and_leaves_record_pending() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"slow fetch", Duration::from_secs(1)).await;
        fx.time.advance(Duration::from_secs(2));

        fx.store.set_latency(Some(Duration::from_millis(300)));
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), fx.ledger.reveal(&record.id, &owner))
                .await;
        assert!(cancelled.is_err());
        assert_eq!(fx.ledger.arena_len(), 0);
        assert_eq!(
            fx.ledger.store.get(&record.id).unwrap().unwrap().state,
            CommitmentState::Pending
        );

        fx.store.set_latency(None);
        let outcome = fx.ledger.reveal(&record.id, &owner).await.unwrap();
        assert_eq!(outcome.content.as_slice(), b"slow fetch");
        assert_eq!(fx.ledger.arena_len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_strand_the_lock() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"queued", Duration::from_secs(1)).await;
        fx.time.advance(Duration::from_secs(2));
        fx.store.set_latency(Some(Duration::from_millis(100)));

        let holder = fx.ledger.reveal(&record.id, &owner);
        let waiter = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tokio::time::timeout(Duration::from_millis(10), fx.ledger.reveal(&record.id, &owner))
                .await
        };
        let (held, waited) = tokio::join!(holder, waiter);
        assert_eq!(held.unwrap().content.as_slice(), b"queued");
        assert!(waited.is_err());
        assert_eq!(fx.ledger.arena_len(), 0);
    }

    #[tokio::test]
    async fn repeat_reveal_is_served_from_the_store() {
        let fx = fixture();
        let owner = OwnerIdentity([1u8; 32]);
        let record = commit(&fx, owner, b"persisted", Duration::from_secs(1)).await;
        fx.time.advance(Duration::from_secs(2));
        fx.ledger.reveal(&record.id, &owner).await.unwrap();

        // Losing the blob no longer matters once the plaintext is stored.
        assert!(fx.store.collect_garbage(record.sealed_locator.as_str()));
        let again = fx.ledger.reveal(&record.id, &owner).await.unwrap();
        assert_eq!(again.content.as_slice(), b"persisted");
        assert_eq!(fx.ledger.gateway().stats().fetch_calls(), 1);
    }
}
