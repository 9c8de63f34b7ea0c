//! Retry policy for NanoGPT requests.
//!
//! A [`RetryConfig`] decides which failures are transient (a fixed set of
//! HTTP statuses plus attempt timeouts), how many attempts a call may make,
//! and how long each attempt may take. Every other failure is raised on the
//! first attempt.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, NanoGptConfig};
use crate::error::RequestError;

/// HTTP statuses retried by default.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 7] = [408, 409, 429, 500, 502, 503, 504];

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2). Attempts are numbered
    /// `0..=max_retries`.
    pub max_retries: u32,
    /// HTTP statuses treated as transient.
    pub retryable_statuses: BTreeSet<u16>,
    /// Timeout applied to each attempt independently (default: 60 seconds).
    pub timeout: Duration,
    /// Base delay before a retry (default: zero, retry immediately).
    pub base_delay: Duration,
    /// Upper bound on the backoff delay (default: 30 seconds).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Derive the policy from client configuration.
    pub fn from_config(config: &NanoGptConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            timeout: config
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            ..defaults
        }
    }

    /// Whether `err`, observed on attempt `attempt` (0-indexed), should be retried.
    pub fn should_retry(&self, err: &RequestError, attempt: u32) -> bool {
        attempt < self.max_retries && self.is_retryable(err)
    }

    /// Whether `err` is a transient failure under this policy.
    pub fn is_retryable(&self, err: &RequestError) -> bool {
        if err.is_timeout() {
            return true;
        }
        err.status
            .is_some_and(|status| self.retryable_statuses.contains(&status))
    }
}

/// Delay before retrying after attempt `n` (0-indexed).
///
/// The delay is `min(base_delay * 2^n, max_delay)`; a zero base delay means
/// retry immediately.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let base_ms = config.base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp);
    let capped_ms = raw_ms.min(config.max_delay.as_millis() as u64);
    Duration::from_millis(capped_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;

    fn status_error(status: u16) -> RequestError {
        RequestError::new("http_error", "boom").with_status(status)
    }

    #[test]
    fn default_config_values() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.base_delay, Duration::ZERO);
        assert_eq!(
            config.retryable_statuses.iter().copied().collect::<Vec<_>>(),
            vec![408, 409, 429, 500, 502, 503, 504]
        );
    }

    #[test]
    fn from_config_overrides() {
        let mut nano = NanoGptConfig::default();
        nano.max_retries = Some(5);
        nano.timeout_ms = Some(250);
        let config = RetryConfig::from_config(&nano);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn every_allow_listed_status_is_retryable() {
        let config = RetryConfig::default();
        for status in DEFAULT_RETRYABLE_STATUSES {
            assert!(config.is_retryable(&status_error(status)), "{status}");
        }
    }

    #[test]
    fn other_statuses_are_not_retryable() {
        let config = RetryConfig::default();
        for status in [400, 401, 402, 403, 404, 422, 501] {
            assert!(!config.is_retryable(&status_error(status)), "{status}");
        }
    }

    #[test]
    fn timeout_is_retryable() {
        let config = RetryConfig::default();
        let err = RequestError::new(code::REQUEST_TIMEOUT, "timed out");
        assert!(config.is_retryable(&err));
    }

    #[test]
    fn abort_and_network_errors_are_not_retryable() {
        let config = RetryConfig::default();
        assert!(!config.is_retryable(&RequestError::new(code::REQUEST_ABORTED, "aborted")));
        assert!(!config.is_retryable(&RequestError::new(code::NETWORK_ERROR, "refused")));
    }

    #[test]
    fn should_retry_respects_attempt_limit() {
        let config = RetryConfig::default();
        let err = status_error(503);
        assert!(config.should_retry(&err, 0));
        assert!(config.should_retry(&err, 1));
        assert!(!config.should_retry(&err, 2));
    }

    #[test]
    fn zero_retries_never_retries() {
        let config = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        assert!(!config.should_retry(&status_error(503), 0));
    }

    #[test]
    fn zero_base_delay_is_immediate() {
        let config = RetryConfig::default();
        assert_eq!(compute_delay(&config, 0), Duration::ZERO);
        assert_eq!(compute_delay(&config, 3), Duration::ZERO);
    }

    #[test]
    fn delay_grows_and_caps() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            ..RetryConfig::default()
        };
        assert_eq!(compute_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(compute_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(compute_delay(&config, 2), Duration::from_millis(400));
        assert_eq!(compute_delay(&config, 3), Duration::from_millis(500));
        assert_eq!(compute_delay(&config, 40), Duration::from_millis(500));
    }
}
