//! Credential and PII masking.
//!
//! Anything surfaced to the caller or written to a log - error messages,
//! payload snapshots, attempt records - passes through here first.
//! Secrets are removed outright; phone numbers, emails and IP addresses
//! are masked down to a recognizable stub.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

/// Replacement for secret material (API tokens).
const SECRET_MASK: &str = "***";

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    static ref IPV4_RE: Regex =
        Regex::new(r"\b(\d{1,3})\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"\+?\d{9,15}").unwrap();
}

/// Scrub a free-form message.
///
/// `secrets` are replaced wholesale; phones keep the country prefix and
/// the last two digits, emails keep the first character of the local
/// part, IPs keep the first octet.
pub fn scrub_text(text: &str, secrets: &[&str]) -> String {
    let mut out = text.to_string();

    for secret in secrets {
        if !secret.is_empty() {
            out = out.replace(secret, SECRET_MASK);
        }
    }

    let out = EMAIL_RE.replace_all(&out, |caps: &Captures| {
        let email = &caps[0];
        match email.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().unwrap_or('*');
                format!("{first}***@{domain}")
            }
            None => SECRET_MASK.to_string(),
        }
    });

    let out = IPV4_RE.replace_all(&out, "$1.***.***.***");

    let out = PHONE_RE.replace_all(&out, |caps: &Captures| {
        let digits: String = caps[0].chars().filter(|c| c.is_ascii_digit()).collect();
        let prefix: String = digits.chars().take(3).collect();
        let suffix: String = digits
            .chars()
            .rev()
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let masked = "*".repeat(digits.len().saturating_sub(5));
        format!("{prefix}{masked}{suffix}")
    });

    out.into_owned()
}

/// Scrub every string inside a JSON payload snapshot, recursively.
///
/// Keys whose name suggests secret material are masked regardless of
/// their value.
pub fn scrub_value(value: &Value, secrets: &[&str]) -> Value {
    match value {
        Value::String(s) => Value::String(scrub_text(s, secrets)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| scrub_value(v, secrets)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if is_secret_key(k) {
                        (k.clone(), Value::String(SECRET_MASK.to_string()))
                    } else {
                        (k.clone(), scrub_value(v, secrets))
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    lowered.contains("token") || lowered.contains("secret") || lowered.contains("password")
}
