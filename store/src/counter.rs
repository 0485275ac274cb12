//! Counter store implementations
//!
//! The rate limiter needs atomic increment-with-expiry semantics so that
//! concurrent requests from the same identity never lose updates. Redis
//! provides that via INCR/EXPIRE; the in-memory store serializes through a
//! mutex and is used by tests and redis-less deployments.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Counter-store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store command failed: {0}")]
    Command(String),
}

/// Shared counter with expiry, keyed by string
///
/// `increment` must be atomic across concurrent callers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment and return the new value (1 on first write).
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Set the key's time-to-live.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Seconds until the key expires; `None` when the key is missing or has
    /// no expiry set.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Current counter value, `None` when the key is missing.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Remove the key.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Redis-backed counter store
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect and verify the server responds to PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid redis url: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut conn = connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("redis PING failed: {e}")))?;
        if pong != "PONG" {
            return Err(StoreError::Unavailable(format!(
                "redis PING returned unexpected response: {pong}"
            )));
        }

        info!("Connected to counter store at {url}");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        conn.incr(key, 1u64)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection.clone();
        let ttl: i64 = conn
            .ttl(key)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        // -2 = missing key, -1 = no expiry set
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(ttl as u64))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(())
    }
}

/// In-process counter store
///
/// Used by tests and by deployments running without Redis. A mutex stands in
/// for Redis's single-threaded command loop, so increments stay atomic.
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

#[derive(Debug)]
struct CounterEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the entry if its expiry has passed, mirroring Redis lazy expiry.
    fn purge_expired(entries: &mut HashMap<String, CounterEntry>, key: &str) {
        if let Some(entry) = entries.get(key) {
            if let Some(expires_at) = entry.expires_at {
                if Instant::now() >= expires_at {
                    entries.remove(key);
                }
            }
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().expect("counter store mutex");
        Self::purge_expired(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: None,
        });
        entry.count += 1;
        Ok(entry.count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("counter store mutex");
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut entries = self.entries.lock().expect("counter store mutex");
        Self::purge_expired(&mut entries, key);
        Ok(entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()).as_secs()))
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut entries = self.entries.lock().expect("counter store mutex");
        Self::purge_expired(&mut entries, key);
        Ok(entries.get(key).map(|entry| entry.count))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("counter store mutex");
        entries.remove(key);
        Ok(())
    }
}
