//! Retry policy for transient storage errors.
//!
//! Stateless: the gateway asks whether to retry and how long to wait.

use std::time::Duration;

use switchboard_types::config::PersistenceConfig;
use switchboard_types::error::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.base_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms.max(config.base_backoff_ms)),
        }
    }

    /// Whether a failed attempt should be retried.
    ///
    /// `attempt` is 0-based: the first execution is attempt 0.
    pub fn should_retry(&self, attempt: u32, error: &RepositoryError) -> bool {
        error.is_transient() && attempt < self.max_retries
    }

    /// Delay before the retry that follows `attempt`: `base * 2^attempt`,
    /// capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PersistenceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(50),
            max: Duration::from_millis(300),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(50));
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(300));
        assert_eq!(p.delay_for(40), Duration::from_millis(300));
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let p = policy();
        assert!(p.should_retry(0, &RepositoryError::Busy("locked".into())));
        assert!(!p.should_retry(0, &RepositoryError::Conflict("dup".into())));
        assert!(!p.should_retry(0, &RepositoryError::Query("bad".into())));
    }

    #[test]
    fn test_retries_bounded() {
        let p = policy();
        let err = RepositoryError::Connection("reset".into());
        assert!(p.should_retry(2, &err));
        assert!(!p.should_retry(3, &err));
    }

    #[test]
    fn test_from_config_keeps_max_at_least_base() {
        let config = PersistenceConfig {
            base_backoff_ms: 500,
            max_backoff_ms: 100,
            ..PersistenceConfig::default()
        };
        let p = RetryPolicy::from_config(&config);
        assert_eq!(p.max, Duration::from_millis(500));
    }
}
