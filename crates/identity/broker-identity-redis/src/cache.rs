use async_trait::async_trait;
use broker_auth_core::{CacheError, CacheResult, SessionCache};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script};
use std::time::Duration;
use tracing::{debug, info};

const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Session cache on a shared, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisSessionCache {
    connection: ConnectionManager,
    delete_if_equals: Script,
}

impl RedisSessionCache {
    /// Connects to the Redis server at `url` (`redis://` or `rediss://`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        info!("Connected to Redis session cache");
        Ok(Self::new(connection))
    }

    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            delete_if_equals: Script::new(DELETE_IF_EQUALS),
        }
    }
}

/// Translates a Redis reply error for a command against `key`.
fn cache_error(error: RedisError, key: &str) -> CacheError {
    if error.code() == Some("WRONGTYPE") || error.kind() == ErrorKind::TypeError {
        return CacheError::WrongType(key.to_string());
    }

    let no_such_key = error.kind() == ErrorKind::ResponseError
        && error
            .detail()
            .is_some_and(|detail| detail.to_ascii_lowercase().contains("no such key"));
    if no_such_key {
        return CacheError::NoSuchKey(key.to_string());
    }

    CacheError::Backend(error.to_string())
}

/// `PX` argument for `ttl`. Redis rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| cache_error(e, key))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| cache_error(e, key))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error(e, key))?;
        Ok(reply.is_some())
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .hget(key, field)
            .await
            .map_err(|e| cache_error(e, key))?;
        Ok(value)
    }

    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut command = redis::cmd("HSET");
        command.arg(key);
        for (field, value) in fields {
            command.arg(*field).arg(*value);
        }

        let mut conn = self.connection.clone();
        let _: () = command
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error(e, key))?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .rename(from, to)
            .await
            .map_err(|e| cache_error(e, from))?;
        debug!("Renamed cache key");
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(key).await.map_err(|e| cache_error(e, key))?;
        Ok(exists)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .delete_if_equals
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error(e, key))?;
        Ok(removed > 0)
    }
}
