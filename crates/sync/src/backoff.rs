// Reconnection backoff: pure function of the consecutive-failure count.

use std::time::Duration;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 30_000;

/// Reconnection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures after which automatic reconnection stops.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt + 1`, doubling from `base_delay` and
    /// capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16); // cap exponent to avoid overflow
        let delay_ms =
            (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exp);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Compute exponential backoff delay for a given attempt number (0-based)
/// under the default policy.
pub fn backoff_delay(attempt: u32) -> Duration {
    ReconnectPolicy::default().delay(attempt)
}
