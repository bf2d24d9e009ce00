//! Redis-backed cache store.
//!
//! The connection is established lazily on the first operation and
//! cached. Transient unavailability degrades gracefully: failed reads
//! count as misses, failed writes are logged no-ops, and the cached
//! connection is dropped so the next operation reconnects.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::warn;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;

use super::{CacheStats, CacheStore};
use crate::errors::AdapterError;

pub struct RedisStore {
    client: redis::Client,
    conn: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisStore {
    /// Validate the connection string and build the store. No network
    /// activity happens here; connecting is deferred to first use.
    pub fn open(url: &str, prefix: &str) -> Result<Self, AdapterError> {
        let client = redis::Client::open(url)
            .map_err(|e| AdapterError::Cache(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: tokio::sync::Mutex::new(None),
            prefix: prefix.to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection after an operation error so the next
    /// operation reconnects instead of reusing a dead socket.
    async fn reset_connection(&self) {
        *self.conn.lock().await = None;
    }

    fn miss(&self) -> Option<Value> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let namespaced = self.namespaced(key);
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis cache: connect failed, treating as miss: {e}");
                return self.miss();
            }
        };

        match conn.get::<_, Option<String>>(&namespaced).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(e) => {
                    warn!("Redis cache: undecodable value under '{namespaced}': {e}");
                    self.miss()
                }
            },
            Ok(None) => self.miss(),
            Err(e) => {
                warn!("Redis cache: GET failed, treating as miss: {e}");
                self.reset_connection().await;
                self.miss()
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) {
        let namespaced = self.namespaced(key);
        let raw = match serde_json::to_string(&value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Redis cache: serialization failed: {e}");
                return;
            }
        };

        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis cache: connect failed, dropping write: {e}");
                return;
            }
        };

        let result: Result<(), redis::RedisError> = if ttl_secs > 0 {
            conn.set_ex(&namespaced, raw, ttl_secs).await
        } else {
            conn.set(&namespaced, raw).await
        };
        if let Err(e) = result {
            warn!("Redis cache: SET failed, dropping write: {e}");
            self.reset_connection().await;
        }
    }

    async fn delete(&self, key: &str) {
        let namespaced = self.namespaced(key);
        if let Ok(mut conn) = self.connection().await {
            let result: Result<(), redis::RedisError> = conn.del(&namespaced).await;
            if let Err(e) = result {
                warn!("Redis cache: DEL failed: {e}");
                self.reset_connection().await;
            }
        }
    }

    async fn clear(&self) {
        let pattern = format!("{}:*", self.prefix);
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Redis cache: connect failed, clear skipped: {e}");
                return;
            }
        };

        match conn.keys::<_, Vec<String>>(&pattern).await {
            Ok(keys) if !keys.is_empty() => {
                let result: Result<(), redis::RedisError> = conn.del(&keys).await;
                if let Err(e) = result {
                    warn!("Redis cache: clear DEL failed: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Redis cache: KEYS failed, clear skipped: {e}");
                self.reset_connection().await;
            }
        }
    }

    async fn stats(&self) -> CacheStats {
        let pattern = format!("{}:*", self.prefix);
        let size = match self.connection().await {
            Ok(mut conn) => conn
                .keys::<_, Vec<String>>(&pattern)
                .await
                .map(|keys| keys.len())
                .unwrap_or(0),
            Err(_) => 0,
        };
        CacheStats {
            size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
