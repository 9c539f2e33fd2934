//! Exponential backoff calculation, shared by the `SyncClient` reconnect
//! loop (250ms → 5s) and any other component that needs to space out
//! retries.

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + random * jitter)`
///
/// # Arguments
///
/// * `attempt` — zero-based attempt index (0 for the first retry)
/// * `base_delay_ms` — base delay in milliseconds
/// * `max_delay_ms` — maximum delay cap
/// * `jitter_factor` — jitter range (0.0–1.0)
/// * `random` — a value in `[0.0, 1.0)` from a PRNG
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to a multiplier in [1-jitter, 1+jitter].
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempt_is_base_delay() {
        let d = calculate_backoff_delay(0, 250, 5_000, 0.0, 0.5);
        assert_eq!(d, 250);
    }

    #[test]
    fn exponential_growth_before_cap() {
        let d1 = calculate_backoff_delay(1, 250, 5_000, 0.0, 0.5);
        let d2 = calculate_backoff_delay(2, 250, 5_000, 0.0, 0.5);
        assert_eq!(d1, 500);
        assert_eq!(d2, 1000);
    }

    #[test]
    fn caps_at_max_delay() {
        let d = calculate_backoff_delay(10, 250, 5_000, 0.0, 0.5);
        assert_eq!(d, 5_000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = calculate_backoff_delay(2, 250, 5_000, 0.0, 0.5);
        let low = calculate_backoff_delay(2, 250, 5_000, 0.3, 0.0);
        let high = calculate_backoff_delay(2, 250, 5_000, 0.3, 0.999_999);
        assert!(low <= base);
        assert!(high >= base);
        assert!(f64::from(u32::try_from(high - low).unwrap()) <= base as f64 * 0.6 + 2.0);
    }

    #[test]
    fn never_negative() {
        let d = calculate_backoff_delay(0, 250, 5_000, 1.0, 0.0);
        assert!(d <= 250);
    }
}
