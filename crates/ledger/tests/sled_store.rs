use powstore_ledger::{LedgerStore, SledLedgerStore};
use powstore_time::TimestampMicros;
use powstore_types::{
    CommitmentId, CommitmentRecord, CommitmentState, Digest, OwnerIdentity, PublicLogEntry, Salt,
    SealKeyRef, SealedLocator,
};
use tempfile::TempDir;

fn record(seed: u8, owner: OwnerIdentity, created_secs: u64) -> CommitmentRecord {
    let id = CommitmentId([seed; 32]);
    CommitmentRecord {
        id,
        owner,
        digest: Digest([seed.wrapping_add(1); 32]),
        salt: Salt([seed.wrapping_add(2); 32]),
        sealed_locator: SealedLocator::new(format!("locator-{seed}")),
        seal_key_ref: SealKeyRef::for_commitment(&id),
        content_len: 64,
        created_at: TimestampMicros::from_secs(created_secs),
        reveal_at: TimestampMicros::from_secs(created_secs + 3_600),
        state: CommitmentState::Pending,
        revealed_at: None,
        repudiation: None,
    }
}

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let owner = OwnerIdentity([7u8; 32]);
    let first = record(1, owner, 100);
    let second = record(2, owner, 50);

    {
        let store = SledLedgerStore::open(dir.path()).unwrap();
        store.insert_new(&first, &[11u8; 32]).unwrap();
        store.insert_new(&second, &[22u8; 32]).unwrap();

        let mut revealed = first.clone();
        revealed.state = CommitmentState::Revealed;
        revealed.revealed_at = Some(TimestampMicros::from_secs(3_800));
        store.store_revealed(&revealed, b"plaintext").unwrap();
        store.flush().unwrap();
    }

    let store = SledLedgerStore::open(dir.path()).unwrap();
    assert_eq!(store.count().unwrap(), 2);
    assert_eq!(
        store.get(&first.id).unwrap().unwrap().state,
        CommitmentState::Revealed
    );
    assert_eq!(store.seal_secret(&second.id).unwrap(), Some([22u8; 32]));
    assert_eq!(
        store.revealed_content(&first.id).unwrap().as_deref(),
        Some(&b"plaintext"[..])
    );
    assert_eq!(store.revealed_content(&second.id).unwrap(), None);

    let listed: Vec<_> = store
        .list_by_owner(&owner)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);

    let log = store.public_log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].sequence, 0);
    assert_eq!(log[1].sequence, 1);
    assert!(PublicLogEntry::verify_chain(&log));
}

#[test]
fn duplicate_insert_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = SledLedgerStore::open(dir.path()).unwrap();
    let owner = OwnerIdentity([3u8; 32]);
    let original = record(5, owner, 10);
    store.insert_new(&original, &[1u8; 32]).unwrap();

    let mut clash = record(5, owner, 20);
    clash.content_len = 1;
    assert!(store.insert_new(&clash, &[2u8; 32]).is_err());

    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.public_log().unwrap().len(), 1);
    assert_eq!(store.seal_secret(&original.id).unwrap(), Some([1u8; 32]));
    assert_eq!(store.get(&original.id).unwrap().unwrap().content_len, 64);
}

#[test]
fn update_of_unknown_record_fails() {
    let dir = TempDir::new().unwrap();
    let store = SledLedgerStore::open(dir.path()).unwrap();
    let ghost = record(9, OwnerIdentity([0u8; 32]), 1);
    assert!(store.update(&ghost).is_err());
    assert!(store.store_revealed(&ghost, b"x").is_err());
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn owner_index_does_not_leak_across_owners() {
    let dir = TempDir::new().unwrap();
    let store = SledLedgerStore::open(dir.path()).unwrap();
    let alice = OwnerIdentity([0xaa; 32]);
    let bob = OwnerIdentity([0xbb; 32]);
    store.insert_new(&record(1, alice, 1), &[0u8; 32]).unwrap();
    store.insert_new(&record(2, bob, 2), &[0u8; 32]).unwrap();

    assert_eq!(store.list_by_owner(&alice).unwrap().len(), 1);
    assert_eq!(store.list_by_owner(&bob).unwrap()[0].id, CommitmentId([2u8; 32]));
    assert!(store
        .list_by_owner(&OwnerIdentity([0xcc; 32]))
        .unwrap()
        .is_empty());
}
