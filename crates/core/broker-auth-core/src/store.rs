use crate::acl::BrokerAcl;
use crate::types::InternalIdentity;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Credential record already exists for {0}")]
    Duplicate(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable store of broker credential records, one per internal identity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_acl(&self, identity: &InternalIdentity) -> StoreResult<Option<BrokerAcl>>;

    async fn insert_acl(&self, acl: BrokerAcl) -> StoreResult<()>;

    /// Replaces the stored credential hash. Returns `false` when no record matched.
    async fn update_passhash(
        &self,
        identity: &InternalIdentity,
        passhash: &str,
    ) -> StoreResult<bool>;
}
