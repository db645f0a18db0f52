use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Faults from the shared cache. Transport errors are surfaced distinctly so
/// the HTTP layer can answer 503 instead of pretending the request was
/// unauthenticated.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
    #[error("cache payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Key-value cache with per-key expiration. Values are JSON documents stored
/// as strings, so any serializable shape round-trips.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key`; without a TTL the entry lives until
    /// explicitly invalidated.
    async fn save(&self, key: &str, value: Value, ttl: Option<Duration>)
        -> Result<(), CacheError>;
    /// Fetch the value at `key`, or `None` when missing or expired.
    async fn recover(&self, key: &str) -> Result<Option<Value>, CacheError>;
    /// Delete `key`. Deleting an absent key is not an error.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

/// Redis-backed implementation over a shared instance.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn save(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, payload, ttl.as_secs()).await?;
            }
            None => {
                let _: () = conn.set(key, payload).await?;
            }
        }
        debug!(%key, "cache save");
        Ok(())
    }

    async fn recover(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(key).await?;
        match data {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        debug!(%key, "cache invalidate");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }
}

/// In-process implementation backing `AppState::fake()` and unit tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn save(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().unwrap().insert(key.to_string(), entry);
        Ok(())
    }

    async fn recover(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.recover(key).await?.is_some())
    }
}
