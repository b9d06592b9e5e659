//! Sealed envelope format: `MAGIC || nonce || ciphertext+tag`.

use crate::error::{GatewayError, Result};
use powstore_crypto::{Aes256GcmCipher, EncryptionError, NONCE_LEN, TAG_LEN};

pub const ENVELOPE_MAGIC: &[u8; 4] = b"PWS1";

const HEADER_LEN: usize = ENVELOPE_MAGIC.len() + NONCE_LEN;

/// Opaque sealed bytes as stored in the content-addressed backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob(Vec<u8>);

impl SealedBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub(crate) fn seal(plaintext: &[u8], key: &[u8]) -> Result<SealedBlob> {
    if plaintext.is_empty() {
        return Err(GatewayError::Seal("plaintext must not be empty".to_string()));
    }
    let cipher = Aes256GcmCipher::new(key).map_err(|e| GatewayError::Seal(e.to_string()))?;
    let nonce = Aes256GcmCipher::generate_nonce();
    let ciphertext = cipher
        .encrypt(plaintext, &nonce)
        .map_err(|e| GatewayError::Seal(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(ENVELOPE_MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(SealedBlob(out))
}

pub(crate) fn unseal(sealed: &SealedBlob, key: &[u8]) -> Result<Vec<u8>> {
    let bytes = sealed.as_bytes();
    if bytes.len() < HEADER_LEN + TAG_LEN {
        return Err(GatewayError::TamperDetected(format!(
            "sealed envelope truncated to {} bytes",
            bytes.len()
        )));
    }
    if &bytes[..ENVELOPE_MAGIC.len()] != ENVELOPE_MAGIC {
        return Err(GatewayError::TamperDetected(
            "sealed envelope header is not recognised".to_string(),
        ));
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes[ENVELOPE_MAGIC.len()..HEADER_LEN]);

    let cipher = Aes256GcmCipher::new(key).map_err(|e| GatewayError::Seal(e.to_string()))?;
    cipher
        .decrypt(&bytes[HEADER_LEN..], &nonce)
        .map_err(|e| match e {
            EncryptionError::AuthenticationFailed => GatewayError::TamperDetected(
                "authentication tag does not verify".to_string(),
            ),
            other => GatewayError::Seal(other.to_string()),
        })
}
