//! In-process cache store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

use super::{CacheStats, CacheStore};

struct Entry {
    value: Value,
    /// `None` means no expiry.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// Map-backed store with lazy expiry on read.
pub struct MemoryStore {
    prefix: String,
    entries: Mutex<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Memory cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Store with an explicit duration; used directly by tests that need
    /// sub-second TTLs.
    fn set_with(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.lock_entries().insert(self.namespaced(key), entry);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let namespaced = self.namespaced(key);
        let mut entries = self.lock_entries();

        match entries.get(&namespaced) {
            Some(entry) if entry.is_expired() => {
                // Lazy eviction on read.
                entries.remove(&namespaced);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) {
        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
        self.set_with(key, value, ttl);
    }

    async fn delete(&self, key: &str) {
        self.lock_entries().remove(&self.namespaced(key));
    }

    async fn clear(&self) {
        self.lock_entries().clear();
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.lock_entries().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
