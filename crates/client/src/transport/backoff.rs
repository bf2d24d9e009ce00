//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Upper bound on any single backoff delay.
const MAX_DELAY_MS: u64 = 30_000;

/// Jitter band applied to the exponential delay.
const JITTER_LOW: f64 = 0.8;
const JITTER_HIGH: f64 = 1.2;

/// Delay before retry number `attempt` (zero-based):
/// `min(30s, base * 2^attempt * jitter)` with jitter drawn uniformly
/// from [0.8, 1.2].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(JITTER_LOW..=JITTER_HIGH);
    delay_with_jitter(base, attempt, jitter)
}

/// Deterministic core of [`backoff_delay`], split out for testing.
fn delay_with_jitter(base: Duration, attempt: u32, jitter: f64) -> Duration {
    let base_ms = base.as_millis() as u64;
    let exponential = base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
    let jittered = (exponential as f64 * jitter) as u64;
    Duration::from_millis(jittered.min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        assert_eq!(delay_with_jitter(base, 0, 1.0), Duration::from_millis(500));
        assert_eq!(delay_with_jitter(base, 1, 1.0), Duration::from_millis(1000));
        assert_eq!(delay_with_jitter(base, 2, 1.0), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_capped_at_thirty_seconds() {
        let base = Duration::from_millis(500);
        assert_eq!(
            delay_with_jitter(base, 20, 1.2),
            Duration::from_millis(MAX_DELAY_MS)
        );
    }

    #[test]
    fn test_jittered_delay_within_band() {
        let base = Duration::from_millis(500);
        for attempt in 0..5 {
            let delay = backoff_delay(base, attempt).as_millis() as f64;
            let center = 500.0 * 2f64.powi(attempt as i32);
            let low = (center * JITTER_LOW).min(MAX_DELAY_MS as f64);
            let high = (center * JITTER_HIGH).min(MAX_DELAY_MS as f64);
            assert!(
                delay >= low.floor() && delay <= high.ceil(),
                "attempt {attempt}: {delay} outside [{low}, {high}]"
            );
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let base = Duration::from_millis(500);
        assert_eq!(
            delay_with_jitter(base, 63, 1.0),
            Duration::from_millis(MAX_DELAY_MS)
        );
        assert_eq!(
            delay_with_jitter(base, 64, 1.0),
            Duration::from_millis(MAX_DELAY_MS)
        );
    }
}
