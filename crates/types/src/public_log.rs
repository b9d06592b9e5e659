//! Append-only public log of commitments.
//!
//! Every entry publishes a commitment's digest and reveal time, chained to
//! the previous entry by hash so that third parties holding a copy of the
//! log can detect rewritten history.

use crate::ids::{CommitmentId, Digest};
use blake3::Hasher;
use powstore_time::TimestampMicros;
use serde::{Deserialize, Serialize};

const PUBLIC_LOG_CONTEXT: &str = "powstore-public-log-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLogEntry {
    pub sequence: u64,
    pub commitment_id: CommitmentId,
    pub digest: Digest,
    pub created_at: TimestampMicros,
    pub reveal_at: TimestampMicros,
    #[serde(with = "hex_bytes")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub entry_hash: [u8; 32],
}

impl PublicLogEntry {
    /// Build the entry that follows `prev` (or the genesis entry when `None`).
    pub fn next(
        prev: Option<&PublicLogEntry>,
        commitment_id: CommitmentId,
        digest: Digest,
        created_at: TimestampMicros,
        reveal_at: TimestampMicros,
    ) -> Self {
        let (sequence, prev_hash) = match prev {
            Some(p) => (p.sequence + 1, p.entry_hash),
            None => (0, [0u8; 32]),
        };
        let mut entry = Self {
            sequence,
            commitment_id,
            digest,
            created_at,
            reveal_at,
            prev_hash,
            entry_hash: [0u8; 32],
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    pub fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Hasher::new();
        hasher.update(PUBLIC_LOG_CONTEXT.as_bytes());
        hasher.update(&self.sequence.to_be_bytes());
        hasher.update(self.commitment_id.as_bytes());
        hasher.update(self.digest.as_bytes());
        hasher.update(&self.created_at.to_be_bytes());
        hasher.update(&self.reveal_at.to_be_bytes());
        hasher.update(&self.prev_hash);
        *hasher.finalize().as_bytes()
    }

    /// Check sequence numbering and hash linkage of a whole log.
    pub fn verify_chain(entries: &[PublicLogEntry]) -> bool {
        let mut prev: Option<&PublicLogEntry> = None;
        for entry in entries {
            let (expected_seq, expected_prev) = match prev {
                Some(p) => (p.sequence + 1, p.entry_hash),
                None => (0, [0u8; 32]),
            };
            if entry.sequence != expected_seq
                || entry.prev_hash != expected_prev
                || entry.entry_hash != entry.compute_hash()
            {
                return false;
            }
            prev = Some(entry);
        }
        true
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(&s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}
