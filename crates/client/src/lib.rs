//! Callbridge Vendor Client Crate
//!
//! Resilient client for a third-party telephony/CRM HTTP API (calls,
//! SMS, contacts, presence, campaigns, blacklists), plus verification
//! and normalization of the vendor's webhook push notifications.
//!
//! # Overview
//!
//! The client supports:
//! - Multi-endpoint failover with per-endpoint retry and jittered
//!   exponential backoff
//! - Per-tenant circuit breaking
//! - Keyed throttling (serialization + minimum spacing per logical key)
//! - Pluggable TTL result caching (memory, redis, disk) and
//!   idempotency memoization
//! - Error classification with credential/PII scrubbing
//!
//! # Architecture
//!
//! ```text
//! +---------------------+
//! | RequestOrchestrator |  (cache, idempotency, composition)
//! +---------------------+
//!     |            |
//!     v            v
//! +--------+  +----------------+
//! | Cache  |  | CircuitBreaker |  (per-tenant admission)
//! +--------+  +----------------+
//!                  |
//!                  v
//!          +----------------+
//!          | KeyedThrottle  |  (optional, per throttle key)
//!          +----------------+
//!                  |
//!                  v
//!          +----------------+
//!          | FailoverClient |  (endpoints x retries, backoff)
//!          +----------------+
//!                  |
//!                  v
//!          +----------------+
//!          | VendorTransport|  (reqwest wire protocol)
//!          +----------------+
//! ```
//!
//! # Core Types
//!
//! - [`RequestOrchestrator`] - Entry point for executing vendor operations
//! - [`Credentials`] - Per-tenant connection settings (tokens never logged)
//! - [`CallOptions`] - Per-call cache/idempotency/throttle/breaker switches
//! - [`WireParams`] - Ordered form-encoded wire payload
//! - [`VendorResponse`] - Operation result with cache provenance
//! - [`AdapterError`] - Classified failure taxonomy with retry semantics
//! - [`OperationFailure`] - Surfaced failure with scrubbed payload
//!   snapshot and timestamp
//! - [`WebhookEvent`] - Normalized inbound push notification

pub mod cache;
pub mod errors;
pub mod exec;
pub mod models;
pub mod transport;
pub mod webhook;

pub use cache::{build_store, CacheConfig, CacheProvider, CacheStats, CacheStore};
pub use errors::{AdapterError, AttemptRecord, OperationFailure, RetryClass};
pub use exec::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, KeyedThrottle, RequestOrchestrator,
};
pub use models::{CallOptions, Credentials, VendorResponse, WireParams, WireValue};
pub use transport::{FailoverClient, HttpTransport, SendOptions, VendorTransport};
pub use webhook::{parse_event, verify_token, WebhookEvent};
