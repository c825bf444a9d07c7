//! Retry Timing
//!
//! Jittered, cancellable sleeps between acquire and renew attempts.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Maximum jitter as a fraction of the base delay
pub const JITTER_FACTOR: f64 = 0.2;

/// `base + uniform(0, factor * base)`
pub fn jittered(base: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || base.is_zero() {
        return base;
    }
    let mut rng = rand::thread_rng();
    base + base.mul_f64(rng.gen_range(0.0..factor))
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` when the full duration elapsed.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
