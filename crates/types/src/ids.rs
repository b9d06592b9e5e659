//! Identifier and fixed-size value types.

use blake3::Hasher;
use powstore_time::TimestampMicros;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const COMMITMENT_ID_CONTEXT: &str = "powstore-commitment-id";

/// Errors emitted when decoding identifiers and fixed-size values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("{kind} must be 64 hex characters, got {len}")]
    InvalidLength { kind: &'static str, len: usize },
    #[error("{kind} must be valid hex: {reason}")]
    InvalidHex { kind: &'static str, reason: String },
}

fn decode_hex32(kind: &'static str, hex_str: &str) -> Result<[u8; 32], IdError> {
    if hex_str.len() != 64 {
        return Err(IdError::InvalidLength {
            kind,
            len: hex_str.len(),
        });
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut out).map_err(|e| IdError::InvalidHex {
        kind,
        reason: e.to_string(),
    })?;
    Ok(out)
}

macro_rules! hex32_newtype {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(hex_str: &str) -> Result<Self, IdError> {
                decode_hex32($kind, hex_str).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_hex()
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s.trim())
            }
        }
    };
}

hex32_newtype!(
    /// Unique identifier of a commitment. Never reused: it mixes the creation
    /// time, digest and owner with fresh random entropy.
    CommitmentId,
    "commitment id"
);

hex32_newtype!(
    /// Opaque identity bound to a commitment at creation.
    OwnerIdentity,
    "owner identity"
);

hex32_newtype!(
    /// Commitment digest over domain tag, salt and content.
    Digest,
    "digest"
);

hex32_newtype!(
    /// Per-commitment secret salt. Disclosed only with the reveal.
    Salt,
    "salt"
);

impl CommitmentId {
    /// Derive a fresh identifier for a commitment created at `created_at`.
    pub fn derive(created_at: TimestampMicros, digest: &Digest, owner: &OwnerIdentity) -> Self {
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);
        Self::derive_with_entropy(created_at, digest, owner, &entropy)
    }

    /// Deterministic variant used by `derive` and by tests.
    pub fn derive_with_entropy(
        created_at: TimestampMicros,
        digest: &Digest,
        owner: &OwnerIdentity,
        entropy: &[u8; 16],
    ) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(COMMITMENT_ID_CONTEXT.as_bytes());
        hasher.update(&created_at.to_be_bytes());
        hasher.update(digest.as_bytes());
        hasher.update(owner.as_bytes());
        hasher.update(entropy);
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitmentId({})", self.to_hex())
    }
}

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerIdentity({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Salts are secret until reveal; keep them out of logs.
impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(<redacted>)")
    }
}

/// Where the sealed bytes live in the external content-addressed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedLocator(pub String);

impl SealedLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SealedLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference into the ledger's key vault. Not the key material itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealKeyRef(pub String);

impl SealKeyRef {
    pub fn for_commitment(id: &CommitmentId) -> Self {
        Self(format!("vault:{}", id.to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
