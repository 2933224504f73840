use std::time::Duration;

use crate::openai::{ApiError, ErrorClass};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const MAX_ATTEMPTS: u32 = 10;
/// Ceiling for computed exponential backoff. Server hints are not capped.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry behavior for create calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// `attempts` is clamped to `[1, MAX_ATTEMPTS]`.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.clamp(1, MAX_ATTEMPTS),
        }
    }

    /// Total tries, including the first one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn classify(&self, err: &ApiError) -> ErrorClass {
        err.class()
    }

    /// Whether a failure on try number `attempt` (1-based) should be retried.
    pub fn should_retry(&self, err: &ApiError, attempt: u32) -> bool {
        self.classify(err) == ErrorClass::Transient && attempt < self.attempts
    }

    /// Delay before the next try: the server's retry-after hint if any,
    /// otherwise `min(60s, 2^attempt s)`.
    pub fn backoff_delay(&self, err: &ApiError, attempt: u32) -> Duration {
        err.retry_after()
            .unwrap_or_else(|| exponential_delay(attempt))
    }
}

fn exponential_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited(retry_after: Option<Duration>) -> ApiError {
        ApiError::RateLimited {
            retry_after,
            message: "Too many requests".into(),
        }
    }

    #[test]
    fn attempts_are_clamped() {
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
        assert_eq!(RetryPolicy::new(4).attempts(), 4);
        assert_eq!(RetryPolicy::new(50).attempts(), MAX_ATTEMPTS);
        assert_eq!(RetryPolicy::default().attempts(), 3);
    }

    #[test]
    fn exponential_backoff_caps_at_sixty_seconds() {
        let policy = RetryPolicy::default();
        let err = ApiError::Timeout("slow".into());
        assert_eq!(policy.backoff_delay(&err, 1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(&err, 2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(&err, 5), Duration::from_secs(32));
        assert_eq!(policy.backoff_delay(&err, 6), MAX_BACKOFF);
        assert_eq!(policy.backoff_delay(&err, 200), MAX_BACKOFF);
    }

    #[test]
    fn server_hint_wins_over_exponential() {
        let policy = RetryPolicy::default();
        let err = rate_limited(Some(Duration::from_millis(250)));
        assert_eq!(policy.backoff_delay(&err, 3), Duration::from_millis(250));

        let hinted_in_text = ApiError::Status {
            status: 503,
            message: "overloaded, retry after 7".into(),
        };
        assert_eq!(
            policy.backoff_delay(&hinted_in_text, 1),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn fatal_errors_are_never_retried() {
        let policy = RetryPolicy::new(5);
        let err = ApiError::Status {
            status: 401,
            message: "invalid api key".into(),
        };
        assert_eq!(policy.classify(&err), ErrorClass::Fatal);
        assert!(!policy.should_retry(&err, 1));
    }

    #[test]
    fn transient_errors_retry_until_budget_is_spent() {
        let policy = RetryPolicy::new(3);
        let err = rate_limited(None);
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
    }
}
