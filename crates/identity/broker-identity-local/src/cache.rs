//! In-memory session cache with Redis command semantics.

use async_trait::async_trait;
use broker_auth_core::{CacheError, CacheResult, SessionCache};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Shared, cloneable in-memory cache. Clones see the same data.
#[derive(Clone, Default)]
pub struct InMemorySessionCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops entries whose TTL has elapsed. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of live keys starting with `prefix`.
    pub async fn count_prefix(&self, prefix: &str) -> usize {
        let entries = self.entries.read().await;
        let now = Utc::now();
        entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .count()
    }
}

fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
    entries.get(key).filter(|entry| !entry.is_expired(Utc::now()))
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.read().await;
        match live(&entries, key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Hash(_)) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry::new(Value::String(value.to_string())));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let ttl =
            chrono::Duration::from_std(ttl).map_err(|e| CacheError::Backend(e.to_string()))?;
        let mut entries = self.entries.write().await;

        if live(&entries, key).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                expires_at: Some(Utc::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.read().await;
        match live(&entries, key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Value::String(_)) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()> {
        let mut entries = self.entries.write().await;

        let expired = entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Utc::now()));
        if expired {
            entries.remove(key);
        }

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));

        match &mut entry.value {
            Value::Hash(existing) => {
                for (field, value) in fields {
                    existing.insert(field.to_string(), value.to_string());
                }
                Ok(())
            }
            Value::String(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> CacheResult<()> {
        let mut entries = self.entries.write().await;

        let entry = match entries.remove(from) {
            Some(entry) if !entry.is_expired(Utc::now()) => entry,
            _ => return Err(CacheError::NoSuchKey(from.to_string())),
        };

        entries.insert(to.to_string(), entry);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let entries = self.entries.read().await;
        Ok(live(&entries, key).is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut entries = self.entries.write().await;

        let matches = matches!(
            live(&entries, key).map(|entry| &entry.value),
            Some(Value::String(current)) if current == value
        );
        if matches {
            entries.remove(key);
        }

        Ok(matches)
    }
}
