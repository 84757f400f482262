use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Credential hashing failed: {0}")]
pub struct HashError(pub String);

/// One-way, salted hash of a bearer token.
///
/// Two calls with the same token return different strings. The output is an
/// opaque password value and must never be compared for equality.
pub trait TokenHasher: Send + Sync {
    fn hash(&self, token: &str) -> Result<String, HashError>;
}
