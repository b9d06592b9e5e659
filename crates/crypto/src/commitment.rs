//! Salted hash commitments.
//!
//! `digest = BLAKE3(tag || salt || content)`. The salt makes equal contents
//! unlinkable across commitments and stops a verifier from brute-forcing
//! small content spaces before the reveal.

use crate::CryptoUtils;
use powstore_types::{Digest, Salt, SALT_LEN};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Domain separation tag mixed into every commitment digest.
pub const COMMITMENT_DOMAIN_TAG: &[u8] = b"powstore/commitment/v1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Derives and checks commitment digests. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentCommitter;

impl ContentCommitter {
    pub fn new() -> Self {
        Self
    }

    /// Fresh random salt for a new commitment.
    pub fn generate_salt() -> Salt {
        Salt(CryptoUtils::random_bytes32())
    }

    /// Commit to `content` under `salt`.
    pub fn commit(&self, content: &[u8], salt: &[u8]) -> Result<Digest, CommitError> {
        if content.is_empty() {
            return Err(CommitError::InvalidInput(
                "content must not be empty".to_string(),
            ));
        }
        if salt.len() != SALT_LEN {
            return Err(CommitError::InvalidInput(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(COMMITMENT_DOMAIN_TAG);
        hasher.update(salt);
        hasher.update(content);
        Ok(Digest(*hasher.finalize().as_bytes()))
    }

    /// Convenience wrapper over [`commit`](Self::commit) for typed salts.
    pub fn commit_salted(&self, content: &[u8], salt: &Salt) -> Result<Digest, CommitError> {
        self.commit(content, salt.as_bytes())
    }

    /// Recompute and compare in constant time.
    pub fn verify(&self, content: &[u8], salt: &[u8], digest: &Digest) -> Result<bool, CommitError> {
        let recomputed = self.commit(content, salt)?;
        Ok(recomputed.as_bytes().ct_eq(digest.as_bytes()).into())
    }

    pub fn verify_salted(
        &self,
        content: &[u8],
        salt: &Salt,
        digest: &Digest,
    ) -> Result<bool, CommitError> {
        self.verify(content, salt.as_bytes(), digest)
    }
}
