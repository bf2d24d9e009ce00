use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde_json::Value;

/// Default TTL for idempotency memoization, in seconds.
pub(crate) const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 86_400;

/// A single wire parameter value.
///
/// Arrays are transmitted as multiple same-name form fields, so they are
/// kept as a list of strings rather than a joined value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireValue {
    /// One form field.
    Single(String),
    /// Repeated form fields under the same name.
    Many(Vec<String>),
}

/// Schema-validated, string-keyed wire payload.
///
/// The adapter treats the payload as opaque: validation and coercion
/// happen upstream. Insertion order is preserved on the wire.
#[derive(Clone, Debug, Default)]
pub struct WireParams {
    entries: Vec<(String, WireValue)>,
}

impl WireParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single-valued field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .push((name.into(), WireValue::Single(value.into())));
        self
    }

    /// Append a repeated field.
    pub fn push_many(&mut self, name: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.entries.push((name.into(), WireValue::Many(values)));
        self
    }

    /// Insert a single-valued field at the front of the payload.
    pub fn prepend(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .insert(0, (name.into(), WireValue::Single(value.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Flatten to form fields, repeating names for `Many` values.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            match value {
                WireValue::Single(v) => fields.push((name.clone(), v.clone())),
                WireValue::Many(vs) => {
                    for v in vs {
                        fields.push((name.clone(), v.clone()));
                    }
                }
            }
        }
        fields
    }

    /// JSON snapshot of the payload for diagnostics. Callers scrub the
    /// result before logging or surfacing it.
    pub fn snapshot(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.entries {
            let v = match value {
                WireValue::Single(s) => Value::String(s.clone()),
                WireValue::Many(vs) => {
                    Value::Array(vs.iter().cloned().map(Value::String).collect())
                }
            };
            map.insert(name.clone(), v);
        }
        Value::Object(map)
    }
}

/// Per-call behavior switches.
///
/// Everything defaults to off: no caching, no idempotency memoization,
/// breaker enforced, no throttling, credential-level timeout and retry
/// settings.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Consult the result cache before the network.
    pub use_cache: bool,
    /// Key under which the result is cached (required for `use_cache`).
    pub cache_key: Option<String>,
    /// TTL for the cached result; defaults to one hour.
    pub cache_ttl_secs: Option<u64>,
    /// Caller-supplied key for idempotent re-execution within the TTL.
    pub idempotency_key: Option<String>,
    /// TTL for idempotency memoization; defaults to one day.
    pub idempotency_ttl_secs: Option<u64>,
    /// Skip the circuit breaker entirely (health checks, low-stakes reads).
    pub bypass_circuit_breaker: bool,
    /// Serialize and rate-limit under this key (e.g. `sms:{gw}:{ext}`).
    pub throttle_key: Option<String>,
    /// Per-call override of the credential HTTP timeout.
    pub timeout_override_ms: Option<u64>,
    /// Never retry a failed attempt; still fails over across endpoints.
    pub disable_retry: bool,
    /// Cooperative cancellation, checked before each delivery attempt.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl CallOptions {
    /// Cached-read options with the given cache key.
    pub fn cached(cache_key: impl Into<String>) -> Self {
        Self {
            use_cache: true,
            cache_key: Some(cache_key.into()),
            ..Self::default()
        }
    }

    pub(crate) fn idempotency_ttl(&self) -> u64 {
        self.idempotency_ttl_secs
            .unwrap_or(DEFAULT_IDEMPOTENCY_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_values_repeat_field_name() {
        let mut params = WireParams::new();
        params.push("cmd", "sendSms");
        params.push_many(
            "to[]",
            vec!["380501111111".to_string(), "380502222222".to_string()],
        );

        assert_eq!(
            params.to_fields(),
            vec![
                ("cmd".to_string(), "sendSms".to_string()),
                ("to[]".to_string(), "380501111111".to_string()),
                ("to[]".to_string(), "380502222222".to_string()),
            ]
        );
    }

    #[test]
    fn test_snapshot_shape() {
        let mut params = WireParams::new();
        params.push("cmd", "makeCall");
        params.push_many("lines", vec!["101".to_string()]);

        let snapshot = params.snapshot();
        assert_eq!(snapshot["cmd"], "makeCall");
        assert_eq!(snapshot["lines"][0], "101");
    }

    #[test]
    fn test_default_idempotency_ttl() {
        let options = CallOptions::default();
        assert_eq!(options.idempotency_ttl(), DEFAULT_IDEMPOTENCY_TTL_SECS);
    }

    #[test]
    fn test_prepend_puts_field_first() {
        let mut params = WireParams::new();
        params.push("to", "380501111111");
        params.prepend("cmd", "sendSms");

        assert_eq!(params.to_fields()[0], ("cmd".to_string(), "sendSms".to_string()));
    }
}
