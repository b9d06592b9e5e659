//! Seal key material.
//!
//! Each commitment gets a random [`SealSecret`] kept in the ledger's vault.
//! The actual AES key is derived from it with HKDF-SHA256, salted with the
//! commitment salt, so the same secret never keys two commitments alike.

use crate::commitment::ContentCommitter;
use crate::CryptoUtils;
use hkdf::Hkdf;
use powstore_types::Salt;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SEAL_KEY_LEN: usize = 32;

const SEAL_KEY_INFO: &[u8] = b"powstore/seal/v1";

/// Random input keying material stored in the key vault.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SealSecret([u8; 32]);

impl SealSecret {
    pub fn generate() -> Self {
        Self(CryptoUtils::random_bytes32())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SealSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealSecret(<redacted>)")
    }
}

/// Derived AES-256 key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealKey([u8; SEAL_KEY_LEN]);

impl SealKey {
    pub fn derive(secret: &SealSecret, salt: &Salt) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), secret.expose());
        let mut okm = [0u8; SEAL_KEY_LEN];
        // 32 bytes is far below the HKDF-SHA256 output limit.
        hk.expand(SEAL_KEY_INFO, &mut okm)
            .unwrap_or_else(|_| unreachable!("32-byte HKDF output is always valid"));
        Self(okm)
    }

    pub fn expose(&self) -> &[u8; SEAL_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SealKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealKey(<redacted>)")
    }
}

impl ContentCommitter {
    /// Derive the seal key for a commitment from its vault secret and salt.
    pub fn derive_seal_key(&self, secret: &SealSecret, salt: &Salt) -> SealKey {
        SealKey::derive(secret, salt)
    }
}
