use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::identity::IdentityToken;
use powstore_crypto::{ContentCommitter, SealSecret};
use powstore_ledger::{CommitmentLedger, NewCommitment};
use powstore_time::TimestampMicros;
use powstore_types::{
    CommitmentId, CommitmentView, Digest, PublicLogEntry, Salt, SealedLocator,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Returned to the committer once the digest is on the public log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentReceipt {
    pub id: CommitmentId,
    pub digest: Digest,
    pub sealed_locator: SealedLocator,
    pub created_at: TimestampMicros,
    pub reveal_at: TimestampMicros,
}

#[derive(Debug, Clone)]
pub struct RevealedContent {
    pub id: CommitmentId,
    pub content: Arc<Vec<u8>>,
    pub salt: Salt,
    pub digest: Digest,
    pub revealed_at: TimestampMicros,
}

/// Entry point for callers: create, reveal and verify commitments.
#[derive(Clone)]
pub struct RevealService {
    ledger: Arc<CommitmentLedger>,
    committer: ContentCommitter,
    config: ServiceConfig,
}

impl RevealService {
    pub fn new(ledger: Arc<CommitmentLedger>, config: ServiceConfig) -> Self {
        Self {
            ledger,
            committer: ContentCommitter::new(),
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<CommitmentLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Commit to `content` now and schedule its reveal.
    ///
    /// The content is sealed and uploaded before the ledger write, so a
    /// failed or abandoned call never leaves a commitment behind.
    #[instrument(skip(self, token, content), fields(provider = %token.provider, size = content.len()))]
    pub async fn create_commitment(
        &self,
        token: &IdentityToken,
        content: &[u8],
        reveal_at: TimestampMicros,
    ) -> Result<CommitmentReceipt> {
        let owner = token.owner_identity()?;
        self.check_content(content)?;

        let now = self.ledger.clock().now()?;
        if reveal_at <= now {
            return Err(ServiceError::InvalidSchedule { reveal_at, now });
        }

        let salt = ContentCommitter::generate_salt();
        let digest = self.committer.commit_salted(content, &salt)?;
        let secret = SealSecret::generate();
        let key = self.committer.derive_seal_key(&secret, &salt);

        let gateway = self.ledger.gateway();
        let sealed = gateway.seal(content, &key)?;
        let sealed_locator = gateway.upload(&sealed).await?;

        let record = self
            .ledger
            .create(NewCommitment {
                owner,
                digest,
                salt,
                sealed_locator: sealed_locator.clone(),
                seal_secret: secret,
                content_len: content.len() as u64,
                reveal_at,
            })
            .map_err(|e| {
                warn!(%sealed_locator, error = %e, "upload succeeded but commitment was not recorded");
                ServiceError::from(e)
            })?;

        info!(commitment = %record.id, "commitment accepted");
        Ok(CommitmentReceipt {
            id: record.id,
            digest: record.digest,
            sealed_locator: record.sealed_locator,
            created_at: record.created_at,
            reveal_at: record.reveal_at,
        })
    }

    /// Owner-triggered reveal.
    #[instrument(skip(self, token), fields(provider = %token.provider, commitment = %id))]
    pub async fn attempt_reveal(
        &self,
        token: &IdentityToken,
        id: &CommitmentId,
    ) -> Result<RevealedContent> {
        let owner = token.owner_identity()?;
        let outcome = self.ledger.reveal(id, &owner).await?;
        let view = outcome.view;
        let salt = view
            .salt
            .ok_or_else(|| ServiceError::Internal(format!("revealed commitment {id} has no salt")))?;
        let revealed_at = view.revealed_at.ok_or_else(|| {
            ServiceError::Internal(format!("revealed commitment {id} has no reveal time"))
        })?;
        Ok(RevealedContent {
            id: view.id,
            content: outcome.content,
            salt,
            digest: view.digest,
            revealed_at,
        })
    }

    /// Anyone may check a claimed file against a revealed commitment.
    #[instrument(skip(self, content), fields(commitment = %id, size = content.len()))]
    pub fn public_verify(&self, id: &CommitmentId, content: &[u8]) -> Result<bool> {
        if content.len() as u64 > self.config.max_content_bytes {
            return Ok(false);
        }
        Ok(self.ledger.verify_externally(id, content)?)
    }

    pub fn commitment(&self, id: &CommitmentId) -> Result<CommitmentView> {
        Ok(self.ledger.get(id)?)
    }

    pub fn commitments_of(&self, token: &IdentityToken) -> Result<Vec<CommitmentView>> {
        let owner = token.owner_identity()?;
        Ok(self.ledger.list_by_owner(&owner)?)
    }

    pub fn public_log(&self) -> Result<Vec<PublicLogEntry>> {
        Ok(self.ledger.public_log()?)
    }

    fn check_content(&self, content: &[u8]) -> Result<()> {
        if content.is_empty() {
            return Err(ServiceError::InvalidInput("content must not be empty".into()));
        }
        let limit = self.config.max_content_bytes;
        if content.len() as u64 > limit {
            return Err(ServiceError::InvalidInput(format!(
                "content is {} bytes, limit is {limit}",
                content.len()
            )));
        }
        Ok(())
    }
}
