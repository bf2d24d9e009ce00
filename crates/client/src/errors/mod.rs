//! Error types and retry classification for the adapter.
//!
//! This module provides:
//! - [`AdapterError`]: The main error enum for all vendor operations
//! - [`OperationFailure`]: a surfaced failure with its diagnostic context
//! - [`RetryClass`]: Classification for determining retry behavior
//! - [`scrub`]: Credential and PII masking for surfaced messages

mod retry;
pub mod scrub;

pub use retry::RetryClass;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Record of one failed delivery attempt, kept for the aggregated
/// failure report. Error text is scrubbed before it is stored here.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AttemptRecord {
    /// Index of the endpoint in the candidate list.
    pub endpoint_index: usize,
    /// Zero-based attempt number against that endpoint.
    pub attempt_index: u32,
    /// Scrubbed description of the failure.
    pub error: String,
    /// When the attempt failed.
    pub at: DateTime<Utc>,
}

/// Errors that can occur while executing a vendor operation.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines whether the
/// failover client retries the attempt or gives up on the endpoint.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// No usable endpoint (or other invalid adapter configuration).
    /// Raised before any network attempt is made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The vendor rejected the credentials (HTTP 401).
    #[error("Authentication failed: check the configured API token")]
    Authentication,

    /// The credentials are valid but lack permission (HTTP 403).
    #[error("Authorization failed: the API token does not permit this operation")]
    Authorization,

    /// The vendor rejected the request payload (HTTP 400/409).
    /// The message lists each offending field and constraint when known.
    #[error("Validation failed: {message}")]
    Validation {
        /// Scrubbed description of the rejected fields.
        message: String,
    },

    /// The addressed resource does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The vendor rate limited the request (HTTP 429).
    /// Retryable with exponential backoff.
    #[error("Rate limited by {endpoint}")]
    RateLimited {
        /// The endpoint that rate limited the request.
        endpoint: String,
    },

    /// The vendor returned a server-side error (HTTP 5xx).
    /// Retryable with exponential backoff.
    #[error("Server error {status} from {endpoint}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// The endpoint that returned the error.
        endpoint: String,
    },

    /// A transport-level failure: timeout, connection reset or refused.
    /// Retryable with exponential backoff.
    #[error("Network error: {message}")]
    Network {
        /// Scrubbed description of the transport failure.
        message: String,
    },

    /// HTTP 200 whose JSON body carried a top-level `error` field.
    /// Treated as an application-level failure; retryable only when the
    /// message matches a known transient marker.
    #[error("Vendor rejected the request: {message}")]
    VendorRejected {
        /// Scrubbed vendor error message.
        message: String,
    },

    /// The circuit breaker rejected the call without a network attempt.
    /// Distinguishes "vendor is down" from "vendor rejected this request".
    #[error("Circuit open for tenant '{tenant}': vendor endpoint is unhealthy")]
    CircuitOpen {
        /// Tenant key of the tripped circuit.
        tenant: String,
    },

    /// Every endpoint and attempt was exhausted without success.
    /// Carries the full per-attempt failure list for diagnostics.
    #[error("All endpoints failed after {} attempts", attempts.len())]
    AllEndpointsFailed {
        /// One record per failed attempt, scrubbed.
        attempts: Vec<AttemptRecord>,
    },

    /// A cache backend could not be constructed or operated on.
    /// Never surfaced from read/write paths (those degrade to misses);
    /// only returned by store constructors, where the factory handles
    /// it as a fallback.
    #[error("Cache store error: {0}")]
    Cache(String),

    /// The caller aborted the operation before an attempt began.
    #[error("Operation cancelled")]
    Cancelled,
}

/// A failure surfaced to the caller by the orchestrator.
///
/// Pairs the classified error with the diagnostic context needed to
/// reproduce it: the operation name, a scrubbed snapshot of the wire
/// payload, and the time the failure was surfaced. Display delegates to
/// the inner error; the context travels alongside for logs and reports.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct OperationFailure {
    /// The classified error.
    #[source]
    pub error: AdapterError,
    /// Vendor operation name.
    pub operation: String,
    /// Scrubbed snapshot of the wire payload.
    pub payload: serde_json::Value,
    /// When the failure was surfaced.
    pub at: DateTime<Utc>,
}

impl AdapterError {
    /// Build a [`Validation`](Self::Validation) error listing each
    /// offending field and its violated constraint.
    pub fn validation_fields(fields: &[(&str, &str)]) -> Self {
        let message = fields
            .iter()
            .map(|(field, constraint)| format!("{field}: {constraint}"))
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation { message }
    }

    /// True when the error may be retried on the same endpoint.
    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Backoff
    }

    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Backoff`]: retry the same endpoint after a delay
    /// - [`RetryClass::Never`]: give up on this endpoint immediately
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network { .. } => {
                RetryClass::Backoff
            }

            // Application-level rejections are terminal unless the vendor
            // flags them as transient in the message body.
            Self::VendorRejected { message } => {
                if retry::is_transient_vendor_message(message) {
                    RetryClass::Backoff
                } else {
                    RetryClass::Never
                }
            }

            Self::Configuration(_)
            | Self::Authentication
            | Self::Authorization
            | Self::Validation { .. }
            | Self::NotFound(_)
            | Self::CircuitOpen { .. }
            | Self::AllEndpointsFailed { .. }
            | Self::Cache(_)
            | Self::Cancelled => RetryClass::Never,
        }
    }
}
