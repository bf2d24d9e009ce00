/// Classification for retry policy.
///
/// Used by the failover client to decide what to do with an error from
/// a delivery attempt.
///
/// # Behavior Summary
///
/// | Class | Retry Same Endpoint? | Then |
/// |-------|----------------------|------|
/// | `Never` | No | Move to the next endpoint |
/// | `Backoff` | Yes, while attempts remain | Exponential delay with jitter |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the request is fundamentally rejected (bad payload,
    /// bad credentials, missing resource) and repeating it won't help.
    /// The failover client moves straight to the next endpoint.
    Never,

    /// Retry the same endpoint with exponential backoff.
    ///
    /// Used for transient conditions: rate limiting (429), server errors
    /// (5xx), transport failures, and vendor messages that match a known
    /// transient marker. Each retry waits
    /// `min(30s, base * 2^attempt * jitter)` before the next attempt.
    Backoff,
}

/// Vendor error-message substrings that indicate a transient condition.
///
/// The vendor reports some overload states as application-level errors
/// on HTTP 200, so classification has to inspect the message text.
const TRANSIENT_MARKERS: &[&str] = &[
    "temporarily unavailable",
    "try again later",
    "server busy",
    "too many connections",
    "gateway timeout",
];

/// True when a vendor application-level error message describes a
/// transient condition worth retrying.
pub(crate) fn is_transient_vendor_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
