use serde_json::Value;

/// Result of a successfully executed vendor operation.
#[derive(Clone, Debug)]
pub struct VendorResponse {
    /// Parsed JSON body from the vendor (or the cached copy of it).
    pub payload: Value,
    /// True when the payload was served from the cache or idempotency
    /// store without touching the network.
    pub from_cache: bool,
    /// True when the hit came specifically from the idempotency store.
    pub idempotency_hit: bool,
    /// Base endpoint that produced the response; `None` on cache hits.
    pub endpoint_used: Option<String>,
    /// `X-Request-ID` of the successful attempt; `None` on cache hits.
    pub request_id: Option<String>,
}

impl VendorResponse {
    /// Wrap a live network response.
    pub(crate) fn live(payload: Value, endpoint: String, request_id: String) -> Self {
        Self {
            payload,
            from_cache: false,
            idempotency_hit: false,
            endpoint_used: Some(endpoint),
            request_id: Some(request_id),
        }
    }

    /// Wrap a cached payload.
    pub(crate) fn cached(payload: Value, idempotency_hit: bool) -> Self {
        Self {
            payload,
            from_cache: true,
            idempotency_hit,
            endpoint_used: None,
            request_id: None,
        }
    }
}
