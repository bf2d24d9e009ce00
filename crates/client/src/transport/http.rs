//! reqwest-backed implementation of the vendor wire protocol.
//!
//! One POST per attempt, `application/x-www-form-urlencoded` body with
//! the auth token as a form field, plus the same token as a bearer
//! header - the vendor requires both transmission modes simultaneously
//! for backward compatibility. A top-level `error` field in a 200-OK
//! JSON body is an application-level failure.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::{TransportRequest, VendorTransport};
use crate::errors::{scrub, AdapterError};

const USER_AGENT: &str = concat!("callbridge-client/", env!("CARGO_PKG_VERSION"));

/// Longest slice of a free-form rejection body kept in the message.
const MAX_BODY_DETAIL: usize = 300;

/// Production transport over reqwest.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport. `tls_verify = false` disables certificate
    /// validation for vendors running self-signed gateways.
    pub fn new(tls_verify: bool) -> Self {
        let client = Client::builder()
            .danger_accept_invalid_certs(!tls_verify)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// Classify a non-2xx status. 400/409 are handled separately so the
    /// response body can be folded into the Validation message.
    fn classify_status(status: StatusCode, endpoint: &str) -> Option<AdapterError> {
        match status {
            StatusCode::UNAUTHORIZED => Some(AdapterError::Authentication),
            StatusCode::FORBIDDEN => Some(AdapterError::Authorization),
            StatusCode::NOT_FOUND => Some(AdapterError::NotFound(endpoint.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Some(AdapterError::RateLimited {
                endpoint: endpoint.to_string(),
            }),
            s if s.is_server_error() => Some(AdapterError::Server {
                status: s.as_u16(),
                endpoint: endpoint.to_string(),
            }),
            _ => None,
        }
    }

    /// Build a Validation error from a 400/409 response body.
    ///
    /// The vendor names offending fields in an `errors` object, or a
    /// plain `error` message; otherwise the raw body text is used,
    /// truncated. Everything is scrubbed before it is surfaced.
    fn validation_from_body(status: StatusCode, body: &str, bearer: &str) -> AdapterError {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            if let Some(Value::Object(fields)) = map.get("errors") {
                let pairs: Vec<(String, String)> = fields
                    .iter()
                    .filter_map(|(field, detail)| {
                        detail
                            .as_str()
                            .map(|d| (field.clone(), scrub::scrub_text(d, &[bearer])))
                    })
                    .collect();
                if !pairs.is_empty() {
                    let refs: Vec<(&str, &str)> = pairs
                        .iter()
                        .map(|(field, detail)| (field.as_str(), detail.as_str()))
                        .collect();
                    return AdapterError::validation_fields(&refs);
                }
            }
            if let Some(message) = map.get("error").and_then(Value::as_str) {
                return AdapterError::Validation {
                    message: scrub::scrub_text(message, &[bearer]),
                };
            }
        }

        let trimmed = body.trim();
        let message = if trimmed.is_empty() {
            format!("vendor rejected the request with HTTP {}", status.as_u16())
        } else {
            let detail: String = trimmed.chars().take(MAX_BODY_DETAIL).collect();
            scrub::scrub_text(&detail, &[bearer])
        };
        AdapterError::Validation { message }
    }
}

#[async_trait]
impl VendorTransport for HttpTransport {
    async fn post_form(&self, request: &TransportRequest) -> Result<Value, AdapterError> {
        let mut builder = self
            .client
            .post(&request.url)
            .bearer_auth(&request.bearer)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-Request-ID", &request.request_id)
            .timeout(request.timeout)
            .form(&request.fields);

        if let Some(key) = &request.idempotency_key {
            builder = builder.header("X-Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timed out"
            } else if e.is_connect() {
                "connection failed"
            } else {
                "request failed"
            };
            AdapterError::Network {
                message: scrub::scrub_text(&format!("{kind}: {e}"), &[&request.bearer]),
            }
        })?;

        let status = response.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::CONFLICT) {
            debug!(
                "HTTP {} from {} (request {})",
                status, request.url, request.request_id
            );
            let body = response.text().await.unwrap_or_default();
            return Err(Self::validation_from_body(status, &body, &request.bearer));
        }
        if let Some(error) = Self::classify_status(status, &request.url) {
            debug!(
                "HTTP {} from {} (request {})",
                status, request.url, request.request_id
            );
            return Err(error);
        }

        let payload: Value = response.json().await.map_err(|e| AdapterError::Network {
            message: scrub::scrub_text(&format!("invalid JSON response: {e}"), &[&request.bearer]),
        })?;

        // Application-level failure signalled on HTTP 200.
        if let Some(error_field) = payload.get("error") {
            let raw = match error_field {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(AdapterError::VendorRejected {
                message: scrub::scrub_text(&raw, &[&request.bearer]),
            });
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let ep = "https://api.example/general";
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::UNAUTHORIZED, ep),
            Some(AdapterError::Authentication)
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::FORBIDDEN, ep),
            Some(AdapterError::Authorization)
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::NOT_FOUND, ep),
            Some(AdapterError::NotFound(_))
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::TOO_MANY_REQUESTS, ep),
            Some(AdapterError::RateLimited { .. })
        ));
        assert!(matches!(
            HttpTransport::classify_status(StatusCode::BAD_GATEWAY, ep),
            Some(AdapterError::Server { status: 502, .. })
        ));
        assert!(HttpTransport::classify_status(StatusCode::OK, ep).is_none());
    }

    #[test]
    fn test_validation_body_with_field_errors() {
        let error = HttpTransport::validation_from_body(
            StatusCode::BAD_REQUEST,
            r#"{"errors":{"phone":"must be E.164"}}"#,
            "tok",
        );
        assert_eq!(
            format!("{error}"),
            "Validation failed: phone: must be E.164"
        );
    }

    #[test]
    fn test_validation_body_with_error_message() {
        let error = HttpTransport::validation_from_body(
            StatusCode::CONFLICT,
            r#"{"error":"duplicate campaign name"}"#,
            "tok",
        );
        assert_eq!(format!("{error}"), "Validation failed: duplicate campaign name");
    }

    #[test]
    fn test_validation_plain_body_is_scrubbed() {
        let error = HttpTransport::validation_from_body(
            StatusCode::BAD_REQUEST,
            "number 380501234567 already queued",
            "tok",
        );
        let rendered = format!("{error}");
        assert!(!rendered.contains("380501234567"));
        assert!(rendered.contains("380*******67"));
    }

    #[test]
    fn test_validation_empty_body_falls_back_to_status() {
        let error = HttpTransport::validation_from_body(StatusCode::CONFLICT, "  ", "tok");
        assert_eq!(
            format!("{error}"),
            "Validation failed: vendor rejected the request with HTTP 409"
        );
    }
}
