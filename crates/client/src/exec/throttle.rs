//! Keyed async throttle.
//!
//! Serializes and rate-limits operations sharing a logical key, e.g. one
//! SMS gateway + sender pair. Two guarantees per key:
//!
//! - at most one operation in flight (later arrivals wait their turn)
//! - consecutive operations start at least `min_interval` apart,
//!   measured from when the previous one *started*
//!
//! Operations under different keys proceed fully concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Default minimum spacing between same-key operations.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Entries idle longer than this (and with no waiter) are evicted.
const IDLE_EVICT_AFTER: Duration = Duration::from_secs(300);

struct ThrottleEntry {
    /// Serializes same-key operations in arrival order.
    gate: Arc<tokio::sync::Mutex<()>>,
    /// Start instant of the most recent operation under this key.
    last_started: Option<Instant>,
    /// Last touch, for idle eviction.
    last_used: Instant,
}

impl ThrottleEntry {
    fn new() -> Self {
        Self {
            gate: Arc::new(tokio::sync::Mutex::new(())),
            last_started: None,
            last_used: Instant::now(),
        }
    }
}

/// Keyed throttle over an owned entry map.
///
/// Explicitly constructed and owned by the orchestrator; entries are
/// created on first use and evicted by [`sweep_idle`](Self::sweep_idle).
pub struct KeyedThrottle {
    entries: Mutex<HashMap<String, ThrottleEntry>>,
}

impl KeyedThrottle {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, ThrottleEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Throttle mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `op` under `key`, serialized against other calls for the same
    /// key and delayed until `min_interval` has passed since the previous
    /// same-key call started.
    pub async fn run<T, F>(&self, key: &str, min_interval: Duration, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let gate = {
            let mut entries = self.lock_entries();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(ThrottleEntry::new);
            entry.last_used = Instant::now();
            Arc::clone(&entry.gate)
        };

        // Arrival-order serialization point for this key.
        let _permit = gate.lock().await;

        let residual = {
            let mut entries = self.lock_entries();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(ThrottleEntry::new);
            entry
                .last_started
                .map(|started| min_interval.saturating_sub(started.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if residual > Duration::ZERO {
            debug!("Throttle: waiting {residual:?} before running '{key}'");
            tokio::time::sleep(residual).await;
        }

        {
            let mut entries = self.lock_entries();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(ThrottleEntry::new);
            let now = Instant::now();
            entry.last_started = Some(now);
            entry.last_used = now;
        }

        op.await
    }

    /// Evict entries with no pending operation that have been idle past
    /// the eviction threshold. Bounds memory under churning keys.
    pub fn sweep_idle(&self) {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            // strong_count > 1 means some call still holds or awaits the gate.
            Arc::strong_count(&entry.gate) > 1 || entry.last_used.elapsed() <= IDLE_EVICT_AFTER
        });
        let swept = before - entries.len();
        if swept > 0 {
            debug!("Throttle: swept {swept} idle entries");
        }
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.lock_entries().len()
    }
}

impl Default for KeyedThrottle {
    fn default() -> Self {
        Self::new()
    }
}
