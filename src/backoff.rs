//! Exponential backoff policy for retryable check failures.

use std::time::Duration;

/// Ceiling on any single backoff wait. Doubling from the default base of
/// 10 s crosses this after five attempts; without a cap a deep retry chain
/// could stall a worker for hours.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Delay to wait before retry number `attempt + 1`.
///
/// `base * 2^attempt`, saturating, capped at [`MAX_DELAY`]. Monotonically
/// non-decreasing in `attempt` for a fixed base.
///
/// ```
/// use std::time::Duration;
/// use hytale_avail::backoff::next_delay;
///
/// let base = Duration::from_secs(10);
/// assert_eq!(next_delay(base, 0), Duration::from_secs(10));
/// assert_eq!(next_delay(base, 1), Duration::from_secs(20));
/// assert_eq!(next_delay(base, 2), Duration::from_secs(40));
/// ```
#[must_use]
pub fn next_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    match base.checked_mul(factor) {
        Some(delay) => delay.min(MAX_DELAY),
        None => MAX_DELAY,
    }
}
