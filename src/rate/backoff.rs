//! Exponential backoff with jitter
//!
//! Controls how remote automation steps are retried before a session is
//! marked failed.

use std::time::Duration;
use rand::Rng;

/// Retry policy for remote automation steps.
///
/// Bounds come from `AppConfig`; these are the documented defaults, not
/// scattered magic numbers.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Attempts per step before the session is marked failed
    pub max_attempts: u32,
    /// Base delay for the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Cap on any single backoff delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_with_jitter(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

/// Calculate delay with exponential backoff and ±20% jitter
pub fn backoff_with_jitter(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let base_delay = base_ms * 2u64.pow(attempt.saturating_sub(1).min(5));
    let capped_delay = base_delay.min(max_ms);

    let jitter_range = capped_delay / 5;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range * 2) as i64 - jitter_range as i64
    } else {
        0
    };

    Duration::from_millis((capped_delay as i64 + jitter).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_with_attempts() {
        let delay1 = backoff_with_jitter(1, 100, 10000);
        let delay2 = backoff_with_jitter(2, 100, 10000);
        let delay3 = backoff_with_jitter(3, 100, 10000);

        // Each subsequent delay should be roughly double (with jitter)
        assert!(delay2.as_millis() > delay1.as_millis() / 2);
        assert!(delay3.as_millis() > delay2.as_millis() / 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        let delay = backoff_with_jitter(10, 1000, 5000);
        // 5000 cap plus at most 20% jitter
        assert!(delay.as_millis() <= 6000);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.delay_for(1).as_millis() > 0);
    }
}
