//! Commitment record and its public projection.

use crate::ids::{CommitmentId, Digest, OwnerIdentity, Salt, SealKeyRef, SealedLocator};
use powstore_time::TimestampMicros;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a commitment.
///
/// `Expired` is never persisted: it is the view of a `Pending` record whose
/// reveal window has passed without a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentState {
    Pending,
    Revealed,
    Expired,
    Repudiated,
}

impl CommitmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitmentState::Revealed | CommitmentState::Repudiated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentState::Pending => "pending",
            CommitmentState::Revealed => "revealed",
            CommitmentState::Expired => "expired",
            CommitmentState::Repudiated => "repudiated",
        }
    }
}

impl fmt::Display for CommitmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted commitment record. Owned by the ledger; callers only ever see a
/// [`CommitmentView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub id: CommitmentId,
    pub owner: OwnerIdentity,
    pub digest: Digest,
    pub salt: Salt,
    pub sealed_locator: SealedLocator,
    pub seal_key_ref: SealKeyRef,
    pub content_len: u64,
    pub created_at: TimestampMicros,
    pub reveal_at: TimestampMicros,
    pub state: CommitmentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_at: Option<TimestampMicros>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repudiation: Option<String>,
}

impl CommitmentRecord {
    /// State as observed at `now`. A pending record past
    /// `reveal_at + expiry_grace` reads as `Expired`.
    pub fn effective_state(&self, now: TimestampMicros, expiry_grace: Duration) -> CommitmentState {
        match self.state {
            CommitmentState::Pending if now >= self.reveal_at.saturating_add(expiry_grace) => {
                CommitmentState::Expired
            }
            state => state,
        }
    }

    /// Public projection. Salt and key reference stay hidden until revealed.
    pub fn view(&self, now: TimestampMicros, expiry_grace: Duration) -> CommitmentView {
        let revealed = self.state == CommitmentState::Revealed;
        CommitmentView {
            id: self.id,
            owner: self.owner,
            digest: self.digest,
            sealed_locator: self.sealed_locator.clone(),
            content_len: self.content_len,
            created_at: self.created_at,
            reveal_at: self.reveal_at,
            state: self.effective_state(now, expiry_grace),
            revealed_at: self.revealed_at,
            salt: revealed.then_some(self.salt),
            seal_key_ref: revealed.then(|| self.seal_key_ref.clone()),
            repudiation: self.repudiation.clone(),
        }
    }
}

/// What any caller may learn about a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentView {
    pub id: CommitmentId,
    pub owner: OwnerIdentity,
    pub digest: Digest,
    pub sealed_locator: SealedLocator,
    pub content_len: u64,
    pub created_at: TimestampMicros,
    pub reveal_at: TimestampMicros,
    pub state: CommitmentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_at: Option<TimestampMicros>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<Salt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seal_key_ref: Option<SealKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repudiation: Option<String>,
}
