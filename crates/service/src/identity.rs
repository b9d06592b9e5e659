use crate::error::{Result, ServiceError};
use powstore_types::OwnerIdentity;
use serde::{Deserialize, Serialize};

const IDENTITY_CONTEXT: &str = "powstore/identity/v1";

/// Verified identity handed over by the external authentication layer.
///
/// The token is trusted as-is; this crate never validates credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    pub provider: String,
    pub subject: String,
}

impl IdentityToken {
    pub fn new(provider: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            subject: subject.into(),
        }
    }

    /// Stable owner identity for this provider/subject pair. Both values
    /// are hashed byte for byte, whitespace included.
    pub fn owner_identity(&self) -> Result<OwnerIdentity> {
        let provider = self.provider.as_str();
        let subject = self.subject.as_str();
        if provider.is_empty() || subject.is_empty() {
            return Err(ServiceError::InvalidInput(
                "identity token needs a provider and a subject".to_string(),
            ));
        }
        if provider.as_bytes().contains(&0) {
            return Err(ServiceError::InvalidInput(
                "identity provider must not contain NUL".to_string(),
            ));
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(IDENTITY_CONTEXT.as_bytes());
        hasher.update(provider.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(subject.as_bytes());
        Ok(OwnerIdentity(*hasher.finalize().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_and_provider_scoped() {
        let a = IdentityToken::new("github", "alice").owner_identity().unwrap();
        let again = IdentityToken::new("github", "alice").owner_identity().unwrap();
        let other_provider = IdentityToken::new("google", "alice").owner_identity().unwrap();
        assert_eq!(a, again);
        assert_ne!(a, other_provider);
    }

    #[test]
    fn whitespace_is_part_of_the_identity() {
        let a = IdentityToken::new("github", "alice").owner_identity().unwrap();
        for token in [
            IdentityToken::new("github", " alice"),
            IdentityToken::new("github", "alice "),
            IdentityToken::new(" github", "alice"),
        ] {
            assert_ne!(token.owner_identity().unwrap(), a);
        }
        assert!(IdentityToken::new("github", "   ").owner_identity().is_ok());
    }

    #[test]
    fn separator_prevents_concatenation_collisions() {
        let left = IdentityToken::new("ab", "c").owner_identity().unwrap();
        let right = IdentityToken::new("a", "bc").owner_identity().unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn blank_tokens_are_rejected() {
        for token in [
            IdentityToken::new("", "alice"),
            IdentityToken::new("github", ""),
            IdentityToken::new("git\0hub", "alice"),
        ] {
            assert!(matches!(
                token.owner_identity(),
                Err(ServiceError::InvalidInput(_))
            ));
        }
    }
}
