//! Document-per-key disk store.
//!
//! Each value is one JSON document whose filename is the md5 hex of the
//! namespaced key. Expiry is stamped inside the document; an expired
//! read is treated as absent and the file is removed best-effort.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CacheStats, CacheStore};
use crate::errors::AdapterError;

#[derive(Serialize, Deserialize)]
struct Document {
    /// Unix millis; `None` means no expiry.
    expires_at_ms: Option<i64>,
    value: Value,
}

impl Document {
    fn is_expired(&self) -> bool {
        self.expires_at_ms
            .map(|deadline| Utc::now().timestamp_millis() >= deadline)
            .unwrap_or(false)
    }
}

/// Disk-backed store rooted at one directory.
pub struct DiskStore {
    dir: PathBuf,
    prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskStore {
    /// Create the store, making the directory if needed. Failure here is
    /// handled by the factory as a fallback to the memory store.
    pub fn create(dir: PathBuf, prefix: &str) -> Result<Self, AdapterError> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| AdapterError::Cache(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            prefix: prefix.to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let namespaced = format!("{}:{}", self.prefix, key);
        let digest = md5::compute(namespaced.as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    fn miss(&self) -> Option<Value> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(_) => return self.miss(),
        };

        let document: Document = match serde_json::from_slice(&raw) {
            Ok(d) => d,
            Err(e) => {
                warn!("Disk cache: unreadable document {}: {e}", path.display());
                let _ = tokio::fs::remove_file(&path).await;
                return self.miss();
            }
        };

        if document.is_expired() {
            let _ = tokio::fs::remove_file(&path).await;
            return self.miss();
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(document.value)
    }

    async fn set(&self, key: &str, value: Value, ttl_secs: u64) {
        let expires_at_ms =
            (ttl_secs > 0).then(|| Utc::now().timestamp_millis() + (ttl_secs as i64) * 1_000);
        let document = Document {
            expires_at_ms,
            value,
        };
        let path = self.path_for(key);
        match serde_json::to_vec(&document) {
            Ok(raw) => {
                if let Err(e) = tokio::fs::write(&path, raw).await {
                    warn!("Disk cache: write failed for {}: {e}", path.display());
                }
            }
            Err(e) => warn!("Disk cache: serialization failed: {e}"),
        }
    }

    async fn delete(&self, key: &str) {
        let _ = tokio::fs::remove_file(self.path_for(key)).await;
    }

    async fn clear(&self) {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Disk cache: cannot list {}: {e}", self.dir.display());
                return;
            }
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }

    async fn stats(&self) -> CacheStats {
        let mut size = 0;
        if let Ok(mut dir) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = dir.next_entry().await {
                if entry.path().extension().is_some_and(|ext| ext == "json") {
                    size += 1;
                }
            }
        }
        CacheStats {
            size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
