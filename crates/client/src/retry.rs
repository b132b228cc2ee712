//! Exponential backoff for transient status-query failures.
//!
//! A failed status query that [`is_transient`](crate::transport::TransportError::is_transient)
//! is retried with increasing delays, at most [`RetryConfig::max_retries`]
//! times, before the poller gives up on the job.

use std::time::Duration;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first failed attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Give up on the first failure.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..retry {
            delay = next_delay(delay, self);
        }
        delay
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = RetryConfig::default();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(8), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let config = RetryConfig {
            multiplier: 3.0,
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(2), &config);
        assert_eq!(d, Duration::from_secs(6));
    }

    #[test]
    fn delay_for_follows_backoff_sequence() {
        let config = RetryConfig::default();
        let expected = [1, 2, 4, 8, 16, 30, 30];

        for (i, &expected_secs) in expected.iter().enumerate() {
            assert_eq!(config.delay_for(i as u32 + 1).as_secs(), expected_secs);
        }
    }

    #[test]
    fn disabled_has_no_retries() {
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }
}
