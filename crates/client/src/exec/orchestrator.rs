//! Request orchestrator.
//!
//! Composes the resilience primitives into one execution path per
//! vendor operation:
//!
//! 1. result cache lookup (when the call opts in)
//! 2. idempotency memoization lookup
//! 3. circuit-breaker admission, then the failover/retry delivery,
//!    optionally serialized under a keyed throttle
//! 4. best-effort cache and idempotency writes on success
//!
//! Failures propagate unchanged and are never cached.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};

use crate::cache::{build_store, CacheConfig, CacheStats, CacheStore};
use crate::errors::{scrub, AdapterError, OperationFailure};
use crate::models::{CallOptions, Credentials, VendorResponse, WireParams};
use crate::transport::{FailoverClient, HttpTransport, SendOptions, VendorTransport};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::throttle::{KeyedThrottle, DEFAULT_MIN_INTERVAL};

/// Errors that count against the circuit for the tenant. Rejections of
/// one specific request (validation, auth, not-found) say nothing about
/// endpoint health and leave the circuit alone.
fn counts_as_breaker_failure(error: &AdapterError) -> bool {
    matches!(error, AdapterError::AllEndpointsFailed { .. }) || error.is_retryable()
}

fn idempotency_cache_key(key: &str) -> String {
    format!("idempotency:{key}")
}

/// Entry point for executing vendor operations.
///
/// One orchestrator per credential set. All components are in-process;
/// dropping the orchestrator drops its circuit and throttle state, while
/// the cache store may outlive it when the backend is external.
pub struct RequestOrchestrator {
    credentials: Credentials,
    endpoints: Vec<String>,
    cache: Arc<dyn CacheStore>,
    breaker: CircuitBreaker,
    breaker_enabled: bool,
    throttle: KeyedThrottle,
    throttle_interval: Duration,
    failover: FailoverClient,
    default_cache_ttl: u64,
}

impl RequestOrchestrator {
    /// Build an orchestrator with the production HTTP transport.
    pub fn new(credentials: Credentials, cache_config: &CacheConfig) -> Self {
        let transport: Arc<dyn VendorTransport> =
            Arc::new(HttpTransport::new(credentials.tls_verify));
        Self::with_transport(credentials, cache_config, transport)
    }

    /// Build an orchestrator over a caller-supplied transport.
    pub fn with_transport(
        credentials: Credentials,
        cache_config: &CacheConfig,
        transport: Arc<dyn VendorTransport>,
    ) -> Self {
        Self {
            endpoints: credentials.endpoints(),
            cache: build_store(cache_config),
            breaker: CircuitBreaker::new(),
            breaker_enabled: true,
            throttle: KeyedThrottle::new(),
            throttle_interval: DEFAULT_MIN_INTERVAL,
            failover: FailoverClient::new(transport),
            default_cache_ttl: cache_config.default_ttl_secs,
            credentials,
        }
    }

    /// Replace the circuit-breaker tuning.
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::with_config(config);
        self
    }

    /// Disable the circuit breaker for every call on this orchestrator.
    pub fn with_breaker_disabled(mut self) -> Self {
        self.breaker_enabled = false;
        self
    }

    /// Change the minimum spacing applied to throttled calls.
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    /// Execute one vendor operation.
    ///
    /// `operation` becomes the `cmd` wire field; `params` carries the
    /// remaining payload. See [`CallOptions`] for the per-call switches.
    /// Failures surface as [`OperationFailure`], which carries the
    /// classified error together with a scrubbed payload snapshot and
    /// the failure time.
    pub async fn execute(
        &self,
        operation: &str,
        params: WireParams,
        options: CallOptions,
    ) -> Result<VendorResponse, OperationFailure> {
        if options.use_cache {
            if let Some(cache_key) = &options.cache_key {
                if let Some(payload) = self.cache.get(cache_key).await {
                    debug!("Operation '{operation}' served from cache ('{cache_key}')");
                    return Ok(VendorResponse::cached(payload, false));
                }
            }
        }

        // Idempotency replay is independent of the cache switch: a
        // memoized result must win even on cache-disabled calls.
        if let Some(key) = &options.idempotency_key {
            if let Some(payload) = self.cache.get(&idempotency_cache_key(key)).await {
                debug!("Operation '{operation}' replayed for idempotency key");
                return Ok(VendorResponse::cached(payload, true));
            }
        }

        let mut params = params;
        params.prepend("cmd", operation);

        let send_options = SendOptions {
            max_retries: self.credentials.max_retries,
            backoff_base: Duration::from_millis(self.credentials.backoff_base_ms),
            timeout: Duration::from_millis(
                options
                    .timeout_override_ms
                    .unwrap_or(self.credentials.timeout_ms),
            ),
            disable_retry: options.disable_retry,
            idempotency_key: options.idempotency_key.clone(),
            cancel: options.cancel.clone(),
        };

        let tenant = self.credentials.tenant_key();
        let enforce_breaker = self.breaker_enabled && !options.bypass_circuit_breaker;

        let delivery = async {
            if enforce_breaker {
                self.breaker.check_admit(tenant)?;
            }
            let result = self
                .failover
                .send(
                    &self.endpoints,
                    &params,
                    &self.credentials.auth_token,
                    &send_options,
                )
                .await;
            if enforce_breaker {
                match &result {
                    Ok(_) => self.breaker.record_success(tenant),
                    Err(error) if counts_as_breaker_failure(error) => {
                        self.breaker.record_failure(tenant)
                    }
                    Err(_) => {}
                }
            }
            result
        };

        let result = match &options.throttle_key {
            Some(key) => self.throttle.run(key, self.throttle_interval, delivery).await,
            None => delivery.await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                let snapshot =
                    scrub::scrub_value(&params.snapshot(), &[&self.credentials.auth_token]);
                warn!("Operation '{operation}' failed: {error} (payload {snapshot})");
                return Err(OperationFailure {
                    error,
                    operation: operation.to_string(),
                    payload: snapshot,
                    at: Utc::now(),
                });
            }
        };

        // Best-effort persistence; store failures are logged inside the
        // store and never fail the call.
        if let Some(cache_key) = &options.cache_key {
            let ttl = options.cache_ttl_secs.unwrap_or(self.default_cache_ttl);
            self.cache
                .set(cache_key, outcome.payload.clone(), ttl)
                .await;
        }
        if let Some(key) = &options.idempotency_key {
            self.cache
                .set(
                    &idempotency_cache_key(key),
                    outcome.payload.clone(),
                    options.idempotency_ttl(),
                )
                .await;
        }

        Ok(VendorResponse::live(
            outcome.payload,
            outcome.endpoint,
            outcome.request_id,
        ))
    }

    /// Cached read of the vendor's user directory.
    pub async fn get_users(&self, filter: Option<&str>) -> Result<VendorResponse, OperationFailure> {
        self.directory_read("getUsers", "users", filter).await
    }

    /// Cached read of the configured shops/queues.
    pub async fn get_shops(&self, filter: Option<&str>) -> Result<VendorResponse, OperationFailure> {
        self.directory_read("getShops", "shops", filter).await
    }

    /// Cached read of the pipeline stages.
    pub async fn get_stages(&self, filter: Option<&str>) -> Result<VendorResponse, OperationFailure> {
        self.directory_read("getStages", "stages", filter).await
    }

    async fn directory_read(
        &self,
        operation: &str,
        kind: &str,
        filter: Option<&str>,
    ) -> Result<VendorResponse, OperationFailure> {
        let mut params = WireParams::new();
        if let Some(filter) = filter {
            params.push("filter", filter);
        }
        let cache_key = format!("directory:{kind}:{}", filter.unwrap_or("all"));
        self.execute(operation, params, CallOptions::cached(cache_key))
            .await
    }

    /// Drop every cached entry in this orchestrator's namespace.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Circuit state for this orchestrator's tenant.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state(self.credentials.tenant_key())
    }

    /// Force this tenant's circuit back to Closed.
    pub fn reset_circuit(&self) {
        self.breaker.reset(self.credentials.tenant_key());
    }

    /// Evict idle circuit and throttle entries. Intended to be called
    /// periodically by long-lived hosts.
    pub fn sweep_idle(&self) {
        self.breaker.sweep_idle();
        self.throttle.sweep_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Pops one canned result per attempt; empty script means success.
    struct ScriptedTransport {
        script: Mutex<Vec<Result<Value, AdapterError>>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<Value, AdapterError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VendorTransport for ScriptedTransport {
        async fn post_form(&self, request: &TransportRequest) -> Result<Value, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(json!({ "status": "ok" }))
            } else {
                script.remove(0)
            }
        }
    }

    fn credentials() -> Credentials {
        let mut creds = Credentials::new("https://a.example", "tok");
        creds.max_retries = 0;
        creds.backoff_base_ms = 1;
        creds
    }

    fn orchestrator(transport: Arc<ScriptedTransport>) -> RequestOrchestrator {
        RequestOrchestrator::with_transport(credentials(), &CacheConfig::default(), transport)
    }

    fn server_error() -> AdapterError {
        AdapterError::Server {
            status: 500,
            endpoint: "https://a.example".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cmd_field_is_prepended() {
        let transport = ScriptedTransport::new(vec![]);
        let orch = orchestrator(transport.clone());

        let mut params = WireParams::new();
        params.push("to", "380501111111");
        orch.execute("makeCall", params, CallOptions::default())
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(
            seen[0].fields[0],
            ("cmd".to_string(), "makeCall".to_string())
        );
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let transport = ScriptedTransport::new(vec![]);
        let orch = orchestrator(transport.clone());
        let options = CallOptions::cached("directory:users:all");

        let first = orch
            .execute("getUsers", WireParams::new(), options.clone())
            .await
            .unwrap();
        assert!(!first.from_cache);
        assert_eq!(transport.calls(), 1);

        let second = orch
            .execute("getUsers", WireParams::new(), options)
            .await
            .unwrap();
        assert!(second.from_cache);
        assert!(!second.idempotency_hit);
        assert_eq!(second.payload, first.payload);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_without_network() {
        let transport = ScriptedTransport::new(vec![]);
        let orch = orchestrator(transport.clone());
        let options = CallOptions {
            idempotency_key: Some("sms-batch-42".to_string()),
            ..CallOptions::default()
        };

        let first = orch
            .execute("sendSms", WireParams::new(), options.clone())
            .await
            .unwrap();
        assert!(!first.idempotency_hit);

        let second = orch
            .execute("sendSms", WireParams::new(), options)
            .await
            .unwrap();
        assert!(second.idempotency_hit);
        assert!(second.from_cache);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_never_cached() {
        let transport = ScriptedTransport::new(vec![Err(AdapterError::Validation {
            message: "phone: invalid".to_string(),
        })]);
        let orch = orchestrator(transport.clone());
        let options = CallOptions::cached("directory:users:all");

        let failure = orch
            .execute("getUsers", WireParams::new(), options.clone())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AdapterError::Validation { .. }));

        // The next call goes back to the network, not the cache.
        orch.execute("getUsers", WireParams::new(), options)
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_network() {
        let transport = ScriptedTransport::new(vec![Err(server_error())]);
        let orch = orchestrator(transport.clone()).with_breaker_config(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            half_open_probe_budget: 3,
            half_open_successes_needed: 3,
        });

        let _ = orch
            .execute("getUsers", WireParams::new(), CallOptions::default())
            .await;
        assert_eq!(orch.circuit_state(), CircuitState::Open);
        assert_eq!(transport.calls(), 1);

        let failure = orch
            .execute("getUsers", WireParams::new(), CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AdapterError::CircuitOpen { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_bypass_skips_the_breaker() {
        let transport = ScriptedTransport::new(vec![Err(server_error())]);
        let orch = orchestrator(transport.clone()).with_breaker_config(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            half_open_probe_budget: 3,
            half_open_successes_needed: 3,
        });

        let _ = orch
            .execute("getUsers", WireParams::new(), CallOptions::default())
            .await;
        assert_eq!(orch.circuit_state(), CircuitState::Open);

        let options = CallOptions {
            bypass_circuit_breaker: true,
            ..CallOptions::default()
        };
        orch.execute("healthCheck", WireParams::new(), options)
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_request_rejections_leave_the_circuit_closed() {
        let transport = ScriptedTransport::new(vec![Err(AdapterError::Validation {
            message: "phone: invalid".to_string(),
        })]);
        let orch = orchestrator(transport).with_breaker_config(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
            half_open_probe_budget: 3,
            half_open_successes_needed: 3,
        });

        let _ = orch
            .execute("makeCall", WireParams::new(), CallOptions::default())
            .await;
        assert_eq!(orch.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_surfaced_failure_carries_scrubbed_context() {
        let transport = ScriptedTransport::new(vec![Err(AdapterError::Validation {
            message: "phone: invalid".to_string(),
        })]);
        let orch = orchestrator(transport);

        let mut params = WireParams::new();
        params.push("phone", "380501234567");

        let before = Utc::now();
        let failure = orch
            .execute("makeCall", params, CallOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AdapterError::Validation { .. }));
        assert_eq!(failure.operation, "makeCall");
        assert_eq!(failure.payload["cmd"], "makeCall");
        // Full phone digits never reach the surfaced snapshot.
        assert_eq!(failure.payload["phone"], "380*******67");
        assert!(failure.at >= before);
    }

    #[tokio::test]
    async fn test_directory_reads_share_the_cache() {
        let transport = ScriptedTransport::new(vec![Ok(json!({ "users": ["alice"] }))]);
        let orch = orchestrator(transport.clone());

        let first = orch.get_users(None).await.unwrap();
        let second = orch.get_users(None).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.payload, json!({ "users": ["alice"] }));
        assert_eq!(transport.calls(), 1);

        // A different filter is a different cache key.
        orch.get_users(Some("active")).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let transport = ScriptedTransport::new(vec![]);
        let orch = orchestrator(transport.clone());

        orch.get_shops(None).await.unwrap();
        orch.clear_cache().await;
        orch.get_shops(None).await.unwrap();

        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_throttled_calls_are_spaced() {
        let transport = ScriptedTransport::new(vec![]);
        let orch =
            orchestrator(transport.clone()).with_throttle_interval(Duration::from_millis(50));
        let options = CallOptions {
            throttle_key: Some("sms:gw:101".to_string()),
            ..CallOptions::default()
        };

        let started = std::time::Instant::now();
        orch.execute("sendSms", WireParams::new(), options.clone())
            .await
            .unwrap();
        orch.execute("sendSms", WireParams::new(), options)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_live_response_carries_endpoint_and_request_id() {
        let transport = ScriptedTransport::new(vec![]);
        let orch = orchestrator(transport);

        let response = orch
            .execute("getBalance", WireParams::new(), CallOptions::default())
            .await
            .unwrap();

        assert_eq!(response.endpoint_used.as_deref(), Some("https://a.example"));
        assert!(response.request_id.is_some());
    }
}
