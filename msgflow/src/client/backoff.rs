//! Retry backoff strategies.

use std::sync::Arc;
use std::time::Duration;

/// Computes the wait before retry attempt `attempt` (zero-based).
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// The default backoff: exponential `500ms * 2^attempt`, capped at 30s.
#[must_use]
pub fn default_backoff(attempt: u32) -> Duration {
    const CAP: Duration = Duration::from_secs(30);
    // 2^7 * 500ms already exceeds the cap; clamp the shift to avoid overflow.
    let factor = 1u64 << attempt.min(7);
    CAP.min(Duration::from_millis(500 * factor))
}
