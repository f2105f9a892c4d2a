//! Retry policy for failed jobs.
//!
//! Retryability is decided from a structured [`ErrorKind`] rather than from
//! error text. Boundaries that only have text available (an opaque upstream
//! message, an `anyhow` chain) classify it once with
//! [`ErrorKind::from_message`].

use std::time::Duration;

use crate::error::{ErrorKind, LlmError};

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Errors that can tell the controller what kind of failure they are.
pub trait Classify {
    /// Returns the failure kind used by the retry policy.
    fn kind(&self) -> ErrorKind;
}

impl Classify for ErrorKind {
    fn kind(&self) -> ErrorKind {
        *self
    }
}

impl Classify for LlmError {
    fn kind(&self) -> ErrorKind {
        LlmError::kind(self)
    }
}

impl Classify for anyhow::Error {
    fn kind(&self) -> ErrorKind {
        match self.downcast_ref::<LlmError>() {
            Some(err) => err.kind(),
            None => ErrorKind::from_message(&format!("{:#}", self)),
        }
    }
}

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit budget and base delay.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Returns whether a job that has already been retried `retry_count`
    /// times should be retried after failing with `kind`.
    pub fn should_retry(&self, kind: ErrorKind, retry_count: u32) -> bool {
        retry_count < self.max_retries && kind.is_retryable()
    }

    /// Backoff before retry number `retry_count` (1-based).
    ///
    /// With the default base of 2s this yields 2s, 4s, 8s.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.backoff(40), Duration::MAX);
    }

    #[test]
    fn test_should_retry_respects_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(ErrorKind::Timeout, 0));
        assert!(policy.should_retry(ErrorKind::Timeout, 2));
        assert!(!policy.should_retry(ErrorKind::Timeout, 3));
    }

    #[test]
    fn test_should_retry_respects_kind() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(ErrorKind::RateLimited, 0));
        assert!(policy.should_retry(ErrorKind::ServiceUnavailable, 0));
        assert!(policy.should_retry(ErrorKind::NetworkFailure, 0));
        assert!(!policy.should_retry(ErrorKind::ClientError, 0));
        assert!(!policy.should_retry(ErrorKind::Unknown, 0));
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert!(!policy.should_retry(ErrorKind::RateLimited, 0));
    }

    #[test]
    fn test_anyhow_classification() {
        let wrapped = anyhow::Error::new(LlmError::RateLimited("slow down".to_string()));
        assert_eq!(Classify::kind(&wrapped), ErrorKind::RateLimited);

        let text = anyhow::anyhow!("upstream said: Request Timeout");
        assert_eq!(Classify::kind(&text), ErrorKind::Timeout);

        let context = anyhow::anyhow!("fetch failed").context("sending chat message");
        assert_eq!(Classify::kind(&context), ErrorKind::NetworkFailure);

        let plain = anyhow::anyhow!("invalid request: missing field");
        assert_eq!(Classify::kind(&plain), ErrorKind::Unknown);
    }
}
