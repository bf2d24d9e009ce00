use std::fmt;

/// Tenant key used when the credentials carry no explicit tenant id.
pub const DEFAULT_TENANT: &str = "default";

/// Default per-attempt HTTP timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default number of retries per endpoint (attempts = retries + 1).
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default backoff base in milliseconds.
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Connection settings for one vendor account.
///
/// Immutable per request. The tenant id keys the per-tenant circuit
/// breaker so one failing account cannot starve another in the same
/// process. The tokens never appear in `Debug` output or logs.
#[derive(Clone)]
pub struct Credentials {
    /// Primary vendor base URL, e.g. `https://api.vendor.example`.
    pub primary_endpoint: String,
    /// Optional failover base URL, tried after the primary is exhausted.
    pub secondary_endpoint: Option<String>,
    /// API token; transmitted both as a bearer header and a form field.
    pub auth_token: String,
    /// Shared token expected on inbound webhook requests.
    pub incoming_webhook_token: String,
    /// When false, TLS certificate validation is disabled.
    pub tls_verify: bool,
    /// Per-attempt HTTP timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries per endpoint on retryable failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub backoff_base_ms: u64,
    /// Tenant identity for circuit-breaker isolation.
    pub tenant_id: Option<String>,
}

impl Credentials {
    /// Build credentials for a single endpoint with default tuning.
    pub fn new(primary_endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            primary_endpoint: primary_endpoint.into(),
            secondary_endpoint: None,
            auth_token: auth_token.into(),
            incoming_webhook_token: String::new(),
            tls_verify: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            tenant_id: None,
        }
    }

    /// The circuit-breaker key for these credentials.
    pub fn tenant_key(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or(DEFAULT_TENANT)
    }

    /// Candidate base endpoints in failover order.
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints = vec![self.primary_endpoint.clone()];
        if let Some(secondary) = &self.secondary_endpoint {
            endpoints.push(secondary.clone());
        }
        endpoints
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("primary_endpoint", &self.primary_endpoint)
            .field("secondary_endpoint", &self.secondary_endpoint)
            .field("auth_token", &"***")
            .field("incoming_webhook_token", &"***")
            .field("tls_verify", &self.tls_verify)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}
