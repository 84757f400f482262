use crate::types::ExternalIdentity;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The identity provider says the token is not live.
    #[error("Token rejected by identity provider")]
    Rejected,

    /// No trustworthy answer was obtained. Must be treated as a rejection.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Confirms a token with the identity provider and names its owner.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, VerifyError>;
}
