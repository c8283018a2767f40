//! Exponential backoff.
//!
//! Delays are deterministic: notification retries and supervisor backoff are
//! observable behaviour (1s, 2s, 4s …), so no jitter is applied.

use std::time::Duration;

/// Supervisor backoff base after a faulted round.
pub const LOOP_BACKOFF_BASE: Duration = Duration::from_secs(60);

/// Supervisor backoff ceiling.
pub const LOOP_BACKOFF_MAX: Duration = Duration::from_secs(3600);

/// `base * 2^attempt`, capped at `max`.
///
/// Attempt 0 yields `base`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Sleep before retrying the supervisor loop after `consecutive_errors` faults:
/// `min(60s * 2^n, 1h)`.
pub fn loop_backoff(consecutive_errors: u32) -> Duration {
    calculate_backoff(consecutive_errors, LOOP_BACKOFF_BASE, LOOP_BACKOFF_MAX)
}
