use std::time::Duration;

use axum::http::StatusCode;

/// Bounded retry with a fixed delay between attempts. There is no delay
/// after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn should_wait_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// How one upstream attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// 5xx; transport failures are treated the same way.
    Retryable,
    /// Everything else, in practice 4xx. Relayed to the caller as is.
    Terminal,
}

pub fn classify(status: StatusCode) -> AttemptOutcome {
    if status.is_success() {
        AttemptOutcome::Success
    } else if status.is_server_error() {
        AttemptOutcome::Retryable
    } else {
        AttemptOutcome::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_status_class() {
        assert_eq!(classify(StatusCode::OK), AttemptOutcome::Success);
        assert_eq!(classify(StatusCode::NO_CONTENT), AttemptOutcome::Success);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), AttemptOutcome::Retryable);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), AttemptOutcome::Retryable);
        assert_eq!(classify(StatusCode::NOT_FOUND), AttemptOutcome::Terminal);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), AttemptOutcome::Terminal);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), AttemptOutcome::Terminal);
    }

    #[test]
    fn no_wait_after_last_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert!(policy.should_wait_after(1));
        assert!(policy.should_wait_after(2));
        assert!(!policy.should_wait_after(3));
    }
}
