use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("No such key: {0}")]
    NoSuchKey(String),

    #[error("Operation against a key holding the wrong kind of value: {0}")]
    WrongType(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value cache holding session entries and identity mappings.
///
/// The operation set mirrors a Redis subset. Implementations are expected to
/// be safe for concurrent use; `rename` must be atomic.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// `GET key`
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value`
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// `SET key value NX PX ttl`. Returns whether the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// `HGET key field`
    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>>;

    /// `HSET key field value [field value ...]`
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()>;

    /// `RENAME from to`. Fails with [`CacheError::NoSuchKey`] when `from` is absent.
    async fn rename(&self, from: &str, to: &str) -> CacheResult<()>;

    /// `EXISTS key`
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Deletes `key` only if it currently holds `value`. Returns whether it was deleted.
    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool>;
}
