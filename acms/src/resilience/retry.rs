use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter, bounded attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay, max_delay: Duration::from_secs(30) }
    }

    /// Delay before attempt `attempt` (0-indexed), `base_delay * 2^attempt`
    /// capped at `max_delay`, plus up to 20% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max_delay.as_millis());
        let jitter_fraction: f64 = rand::rng().random_range(0.0..0.2);
        let jittered = capped as f64 * (1.0 + jitter_fraction);
        Duration::from_millis(jittered as u64)
    }
}
