//! Request transport: failover loop, retry policy, and the HTTP seam.
//!
//! [`FailoverClient`] owns the delivery policy: it walks the candidate
//! endpoints in order, retries transient failures per endpoint with
//! exponential backoff, and aggregates every failed attempt into one
//! diagnostic error. The actual HTTP call goes through the
//! [`VendorTransport`] trait so tests can substitute a mock transport,
//! with [`HttpTransport`] as the production implementation.

mod backoff;
mod http;

pub use backoff::backoff_delay;
pub use http::HttpTransport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;

use crate::errors::{scrub, AdapterError, AttemptRecord, RetryClass};
use crate::models::WireParams;

/// Path every vendor operation is POSTed to, relative to the base URL.
const VENDOR_PATH: &str = "/general";

/// One fully-prepared delivery attempt.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// Absolute URL of the attempt.
    pub url: String,
    /// Form fields, auth token included. Repeated names stay repeated.
    pub fields: Vec<(String, String)>,
    /// Token for the `Authorization: Bearer` header. The vendor protocol
    /// requires the token in the header AND as a form field.
    pub bearer: String,
    /// Unique id sent as `X-Request-ID`.
    pub request_id: String,
    /// Optional `X-Idempotency-Key` header.
    pub idempotency_key: Option<String>,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

/// Seam between the failover loop and the HTTP stack.
///
/// Implementations perform exactly one delivery attempt and classify
/// the outcome into [`AdapterError`] variants. Implementations must
/// treat an `error` field in a 200-OK JSON body as a failure.
#[async_trait]
pub trait VendorTransport: Send + Sync {
    async fn post_form(&self, request: &TransportRequest) -> Result<Value, AdapterError>;
}

/// Delivery policy knobs for one logical call.
#[derive(Clone, Default)]
pub struct SendOptions {
    /// Retries per endpoint on retryable failures (attempts = retries + 1).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    /// When set, a failed attempt is never retried on the same endpoint.
    pub disable_retry: bool,
    /// Forwarded as the `X-Idempotency-Key` header.
    pub idempotency_key: Option<String>,
    /// Cooperative cancellation, checked before each attempt begins.
    /// In-flight attempts are bounded by `timeout` only.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SendOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Result of a successful delivery.
#[derive(Debug)]
pub struct SendOutcome {
    /// Parsed JSON body.
    pub payload: Value,
    /// Base endpoint that answered.
    pub endpoint: String,
    /// Request id of the winning attempt.
    pub request_id: String,
}

/// Multi-endpoint failover client with per-endpoint retry.
pub struct FailoverClient {
    transport: Arc<dyn VendorTransport>,
}

impl FailoverClient {
    pub fn new(transport: Arc<dyn VendorTransport>) -> Self {
        Self { transport }
    }

    /// Deliver `params` to the first endpoint that answers.
    ///
    /// Endpoints are first filtered to well-formed `http(s)://` URLs; an
    /// empty result fails fast with a configuration error before any
    /// network activity. Each endpoint gets up to `max_retries + 1`
    /// attempts; only retryable errors are retried, and a non-retryable
    /// error moves on to the next endpoint rather than aborting the
    /// whole call. The first success wins.
    ///
    /// When a single attempt was made in total, its classified error
    /// surfaces directly; otherwise the aggregated failure carries every
    /// attempt record (already scrubbed).
    pub async fn send(
        &self,
        endpoints: &[String],
        params: &WireParams,
        auth_token: &str,
        options: &SendOptions,
    ) -> Result<SendOutcome, AdapterError> {
        let valid: Vec<&String> = endpoints.iter().filter(|e| is_valid_endpoint(e)).collect();
        if valid.is_empty() {
            return Err(AdapterError::Configuration(
                "no valid http(s) endpoint configured".to_string(),
            ));
        }

        // Token must travel in the body as well as the header.
        let mut fields = params.to_fields();
        fields.push(("token".to_string(), auth_token.to_string()));

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<AdapterError> = None;

        for (endpoint_index, endpoint) in valid.iter().enumerate() {
            let url = format!("{}{}", endpoint.trim_end_matches('/'), VENDOR_PATH);

            for attempt_index in 0..=options.max_retries {
                if options.cancelled() {
                    return Err(AdapterError::Cancelled);
                }

                let request = TransportRequest {
                    url: url.clone(),
                    fields: fields.clone(),
                    bearer: auth_token.to_string(),
                    request_id: uuid::Uuid::new_v4().to_string(),
                    idempotency_key: options.idempotency_key.clone(),
                    timeout: options.timeout,
                };

                match self.transport.post_form(&request).await {
                    Ok(payload) => {
                        debug!(
                            "Delivered to '{}' on attempt {} (request {})",
                            endpoint, attempt_index, request.request_id
                        );
                        return Ok(SendOutcome {
                            payload,
                            endpoint: (*endpoint).clone(),
                            request_id: request.request_id,
                        });
                    }
                    Err(error) => {
                        let retry_class = error.retry_class();
                        attempts.push(AttemptRecord {
                            endpoint_index,
                            attempt_index,
                            error: scrub::scrub_text(&error.to_string(), &[auth_token]),
                            at: Utc::now(),
                        });

                        let retries_remain = attempt_index < options.max_retries;
                        if retry_class == RetryClass::Never || options.disable_retry {
                            debug!(
                                "Endpoint '{}' failed terminally on attempt {}, \
                                 moving to next endpoint",
                                endpoint, attempt_index
                            );
                            last_error = Some(error);
                            break;
                        }

                        last_error = Some(error);
                        if retries_remain {
                            let delay = backoff_delay(options.backoff_base, attempt_index);
                            debug!(
                                "Retryable failure on '{}' attempt {}, backing off {:?}",
                                endpoint, attempt_index, delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        warn!(
            "All endpoints exhausted after {} attempts",
            attempts.len()
        );
        if attempts.len() <= 1 {
            // A lone failure keeps its precise classification.
            Err(last_error.unwrap_or(AdapterError::AllEndpointsFailed { attempts }))
        } else {
            Err(AdapterError::AllEndpointsFailed { attempts })
        }
    }
}

/// True for well-formed absolute `http://` or `https://` URLs.
fn is_valid_endpoint(endpoint: &str) -> bool {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
