//! Pluggable key/value cache with TTL.
//!
//! One [`CacheStore`] instance backs both concerns of the orchestrator:
//! read-through caching of slow-changing directory data and idempotency
//! result memoization. Three variants exist - in-process map, redis, and
//! a document-per-key disk store - selected by [`CacheConfig`] through
//! [`build_store`]. Construction failure of an external variant falls
//! back to the in-process store; the adapter never refuses to start
//! because a cache backend is unreachable.
//!
//! Store errors never propagate to callers: failed reads are misses,
//! failed writes are logged no-ops.

mod disk;
mod memory;
mod redis_store;

pub use disk::DiskStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

/// Default namespace prefix for cache keys.
const DEFAULT_KEY_PREFIX: &str = "callbridge";

/// Default TTL for cached values, in seconds.
const DEFAULT_TTL_SECS: u64 = 3_600;

/// Counters exposed by every store.
#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct CacheStats {
    /// Entries currently held (including not-yet-evicted expired ones).
    pub size: usize,
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (or an expired/broken entry).
    pub misses: u64,
}

/// Key/value store with TTL semantics.
///
/// `ttl_secs == 0` means "no expiry". All keys are namespaced with the
/// store's configured prefix, so one physical backend can be shared by
/// multiple adapter instances.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value; expired entries read as absent.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value. Best-effort: backend failures are logged, not raised.
    async fn set(&self, key: &str, value: Value, ttl_secs: u64);

    /// Remove a single key.
    async fn delete(&self, key: &str);

    /// Remove every key in this store's namespace.
    async fn clear(&self);

    /// Current counters.
    async fn stats(&self) -> CacheStats;
}

/// Which backend to use.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CacheProvider {
    /// In-process map; the fallback for every other variant.
    #[default]
    Memory,
    /// Networked key-value service.
    Redis,
    /// Document-per-key JSON files on disk.
    Disk,
}

/// Cache configuration, usually sourced from credential/env fields.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub provider: CacheProvider,
    /// Connection string for the redis variant.
    pub connection_string: Option<String>,
    /// Directory for the disk variant.
    pub directory: Option<PathBuf>,
    /// Namespace prefix applied to every key.
    pub key_prefix: String,
    /// TTL applied when a call supplies none.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: CacheProvider::Memory,
            connection_string: None,
            directory: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Build the configured store, falling back to [`MemoryStore`] when an
/// external backend cannot be constructed. The fallback is logged once
/// here; callers get a working store either way.
pub fn build_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    match config.provider {
        CacheProvider::Memory => Arc::new(MemoryStore::new(&config.key_prefix)),
        CacheProvider::Redis => {
            let url = match &config.connection_string {
                Some(url) => url.clone(),
                None => {
                    warn!("Cache: redis selected but no connection string, using memory store");
                    return Arc::new(MemoryStore::new(&config.key_prefix));
                }
            };
            match RedisStore::open(&url, &config.key_prefix) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!("Cache: redis store unavailable ({e}), using memory store");
                    Arc::new(MemoryStore::new(&config.key_prefix))
                }
            }
        }
        CacheProvider::Disk => {
            let dir = match &config.directory {
                Some(dir) => dir.clone(),
                None => {
                    warn!("Cache: disk selected but no directory, using memory store");
                    return Arc::new(MemoryStore::new(&config.key_prefix));
                }
            };
            match DiskStore::create(dir, &config.key_prefix) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!("Cache: disk store unavailable ({e}), using memory store");
                    Arc::new(MemoryStore::new(&config.key_prefix))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_factory_defaults_to_memory() {
        let store = build_store(&CacheConfig::default());
        store.set("k", json!(1), 0).await;
        assert_eq!(store.get("k").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_factory_falls_back_when_redis_misconfigured() {
        // Malformed URL fails at construction; the factory substitutes
        // the in-process store and the contract still holds.
        let config = CacheConfig {
            provider: CacheProvider::Redis,
            connection_string: Some("not a redis url".to_string()),
            ..CacheConfig::default()
        };
        let store = build_store(&config);

        store.set("fallback", json!({"ok": true}), 60).await;
        assert_eq!(store.get("fallback").await, Some(json!({"ok": true})));

        let stats = store.stats().await;
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_factory_falls_back_when_redis_has_no_url() {
        let config = CacheConfig {
            provider: CacheProvider::Redis,
            ..CacheConfig::default()
        };
        let store = build_store(&config);
        store.set("k", json!("v"), 0).await;
        assert_eq!(store.get("k").await, Some(json!("v")));
    }
}
