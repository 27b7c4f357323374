//! Retry policy for classification batches.
//!
//! Transient failures (network, 403) back off linearly from one base delay,
//! rate limiting backs off from a longer one. Anything else is not retried
//! here; 413 has its own remediation in the classification phase.

use std::time::Duration;

use slides_ml_client::ErrorKind;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Per-attempt delay for network and 403 failures.
    pub transient_delay: Duration,
    /// Per-attempt delay for 429 responses.
    pub rate_limited_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            transient_delay: Duration::from_secs(1),
            rate_limited_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set both base delays. Mostly useful in tests.
    pub fn with_delays(mut self, transient: Duration, rate_limited: Duration) -> Self {
        self.transient_delay = transient;
        self.rate_limited_delay = rate_limited;
        self
    }

    /// Delay before retry number `attempt` (1-based), or `None` when the
    /// failure should not be retried.
    pub fn delay_for(&self, kind: ErrorKind, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let base = match kind {
            ErrorKind::Network | ErrorKind::Forbidden => self.transient_delay,
            ErrorKind::RateLimited => self.rate_limited_delay,
            ErrorKind::PayloadTooLarge | ErrorKind::Http | ErrorKind::Unknown => return None,
        };
        Some(base.saturating_mul(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_by_kind() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for(ErrorKind::Network, 1), Some(Duration::from_secs(1)));
        assert_eq!(config.delay_for(ErrorKind::Forbidden, 2), Some(Duration::from_secs(2)));
        assert_eq!(config.delay_for(ErrorKind::RateLimited, 1), Some(Duration::from_secs(10)));
        assert_eq!(config.delay_for(ErrorKind::RateLimited, 2), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_ceiling_and_non_retryable_kinds() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for(ErrorKind::Network, 3), None);
        assert_eq!(config.delay_for(ErrorKind::PayloadTooLarge, 1), None);
        assert_eq!(config.delay_for(ErrorKind::Http, 1), None);
        assert_eq!(config.delay_for(ErrorKind::Unknown, 1), None);

        let none = RetryConfig::default().with_max_retries(0);
        assert_eq!(none.delay_for(ErrorKind::Network, 1), None);
    }
}
