//! Cryptographic primitives for PowStore
//!
//! - [`ContentCommitter`]: salted, domain-separated BLAKE3 commitments
//! - [`SealKey`]: HKDF-derived symmetric keys, zeroized on drop
//! - [`Aes256GcmCipher`]: authenticated encryption used to seal content

use rand_core::{OsRng, RngCore};

pub mod commitment;
pub mod encryption;
pub mod seal_key;

pub use commitment::{CommitError, ContentCommitter, COMMITMENT_DOMAIN_TAG};
pub use encryption::{Aes256GcmCipher, EncryptionError, NONCE_LEN, TAG_LEN};
pub use seal_key::{SealKey, SealSecret, SEAL_KEY_LEN};

/// Cryptographic utilities
pub struct CryptoUtils;

impl CryptoUtils {
    /// Fill a fresh 32-byte array from the OS RNG.
    pub fn random_bytes32() -> [u8; 32] {
        let mut out = [0u8; 32];
        OsRng.fill_bytes(&mut out);
        out
    }
}
