//! Inbound webhook verification and event normalization.
//!
//! The vendor pushes notifications as POST bodies carrying a `cmd`
//! discriminator and a shared auth token. This module is transport
//! agnostic: the host hands over the parsed JSON body, gets back a
//! typed event or an authentication error, and owns the HTTP 401
//! response itself.

use serde_json::Value;

use crate::errors::AdapterError;

/// Normalized vendor push notification.
///
/// Each variant keeps the token-stripped raw body in `payload` so the
/// host can reach fields the normalization does not lift out. Phone
/// numbers are passed through as received; scrubbing applies to logs,
/// not to delivered events.
#[derive(Clone, Debug, PartialEq)]
pub enum WebhookEvent {
    /// A call is ringing on one of the tenant's lines.
    IncomingCall {
        caller: String,
        extension: Option<String>,
        payload: Value,
    },
    /// A call finished (answered or not).
    CallCompleted {
        call_id: Option<String>,
        duration_secs: Option<u64>,
        disposition: Option<String>,
        payload: Value,
    },
    /// An SMS arrived on a tenant number.
    IncomingSms {
        from: String,
        text: String,
        payload: Value,
    },
    /// A dialer campaign changed state.
    CampaignStatus {
        campaign_id: Option<String>,
        status: Option<String>,
        payload: Value,
    },
    /// A `cmd` this adapter version does not know.
    Unknown { cmd: String, payload: Value },
}

/// Compare the webhook token against the configured one without
/// short-circuiting on the first differing byte.
pub fn verify_token(provided: &str, expected: &str) -> bool {
    constant_time_eq(provided, expected)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

fn str_field(body: &Value, name: &str) -> Option<String> {
    body.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Verify and normalize one webhook body.
///
/// Rejects with [`AdapterError::Authentication`] when the `token` field
/// does not match `expected_token`; the caller must not process the
/// body further in that case. An unknown `cmd` is not an error, it
/// yields [`WebhookEvent::Unknown`] so new vendor events degrade
/// gracefully.
pub fn parse_event(body: &Value, expected_token: &str) -> Result<WebhookEvent, AdapterError> {
    let provided = body.get("token").and_then(Value::as_str).unwrap_or("");
    if !verify_token(provided, expected_token) {
        return Err(AdapterError::Authentication);
    }

    let cmd = str_field(body, "cmd")
        .ok_or_else(|| AdapterError::validation_fields(&[("cmd", "missing")]))?;

    // The shared token must not travel with the delivered event.
    let mut payload = body.clone();
    if let Some(map) = payload.as_object_mut() {
        map.remove("token");
    }

    let event = match cmd.as_str() {
        "incomingCall" => WebhookEvent::IncomingCall {
            caller: str_field(body, "phone")
                .ok_or_else(|| AdapterError::validation_fields(&[("phone", "missing")]))?,
            extension: str_field(body, "ext"),
            payload,
        },
        "callCompleted" => WebhookEvent::CallCompleted {
            call_id: str_field(body, "call_id"),
            duration_secs: body.get("duration").and_then(Value::as_u64),
            disposition: str_field(body, "disposition"),
            payload,
        },
        "incomingSms" => WebhookEvent::IncomingSms {
            from: str_field(body, "phone")
                .ok_or_else(|| AdapterError::validation_fields(&[("phone", "missing")]))?,
            text: str_field(body, "text").unwrap_or_default(),
            payload,
        },
        "campaignStatus" => WebhookEvent::CampaignStatus {
            campaign_id: str_field(body, "campaign_id"),
            status: str_field(body, "status"),
            payload,
        },
        _ => WebhookEvent::Unknown { cmd, payload },
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hook-secret", "hook-secret"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("hook-secret", "hook-secreT"));
        assert!(!constant_time_eq("short", "longer"));
    }

    #[test]
    fn test_token_mismatch_is_authentication_error() {
        let body = json!({ "cmd": "incomingCall", "token": "wrong", "phone": "380501234567" });
        let error = parse_event(&body, "right").unwrap_err();
        assert!(matches!(error, AdapterError::Authentication));
    }

    #[test]
    fn test_missing_token_is_authentication_error() {
        let body = json!({ "cmd": "incomingCall", "phone": "380501234567" });
        assert!(parse_event(&body, "secret").is_err());
    }

    #[test]
    fn test_incoming_call_normalization() {
        let body = json!({
            "cmd": "incomingCall",
            "token": "secret",
            "phone": "380501234567",
            "ext": "101",
        });

        match parse_event(&body, "secret").unwrap() {
            WebhookEvent::IncomingCall {
                caller,
                extension,
                payload,
            } => {
                assert_eq!(caller, "380501234567");
                assert_eq!(extension.as_deref(), Some("101"));
                // Token stripped from the delivered payload.
                assert!(payload.get("token").is_none());
                assert_eq!(payload["phone"], "380501234567");
            }
            other => panic!("expected IncomingCall, got {other:?}"),
        }
    }

    #[test]
    fn test_call_completed_normalization() {
        let body = json!({
            "cmd": "callCompleted",
            "token": "secret",
            "call_id": "c-42",
            "duration": 37,
            "disposition": "answered",
        });

        match parse_event(&body, "secret").unwrap() {
            WebhookEvent::CallCompleted {
                call_id,
                duration_secs,
                disposition,
                ..
            } => {
                assert_eq!(call_id.as_deref(), Some("c-42"));
                assert_eq!(duration_secs, Some(37));
                assert_eq!(disposition.as_deref(), Some("answered"));
            }
            other => panic!("expected CallCompleted, got {other:?}"),
        }
    }

    #[test]
    fn test_incoming_sms_requires_sender() {
        let body = json!({ "cmd": "incomingSms", "token": "secret", "text": "hi" });
        let error = parse_event(&body, "secret").unwrap_err();
        assert!(matches!(error, AdapterError::Validation { .. }));
    }

    #[test]
    fn test_unknown_cmd_degrades_gracefully() {
        let body = json!({ "cmd": "somethingNew", "token": "secret", "extra": 1 });

        match parse_event(&body, "secret").unwrap() {
            WebhookEvent::Unknown { cmd, payload } => {
                assert_eq!(cmd, "somethingNew");
                assert_eq!(payload["extra"], 1);
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_cmd_is_validation_error() {
        let body = json!({ "token": "secret" });
        let error = parse_event(&body, "secret").unwrap_err();
        assert!(matches!(error, AdapterError::Validation { .. }));
    }
}
