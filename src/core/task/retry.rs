use std::time::Duration;

use crate::core::error::DownloadError;

/// 重试策略：指数退避加抖动
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// 抖动因子，避免多个分块同时失败后齐步重试
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, error: &DownloadError, attempts: usize) -> bool {
        if attempts >= self.max_retries {
            return false;
        }
        // 暂停/取消和致命错误都不重试，Range 被忽略交给策略回退处理
        if error.is_cancellation() || error.is_fatal() {
            return false;
        }
        error.is_retryable()
    }

    pub fn delay_for(&self, attempts: usize) -> Duration {
        let delay_secs =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempts as i32);
        let jitter = delay_secs * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let delay = Duration::from_secs_f64((delay_secs + jitter).max(0.1));
        delay.min(self.max_delay)
    }
}

/// 单次传输内的重试计数
#[derive(Debug)]
pub struct RetryContext {
    pub policy: RetryPolicy,
    pub attempts: usize,
}

impl RetryContext {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn should_retry(&self, error: &DownloadError) -> bool {
        self.policy.should_retry(error, self.attempts)
    }

    pub fn record_attempt(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_attempts_are_bounded() {
        let policy = RetryPolicy::default();
        let err = DownloadError::NetworkError("connection reset".to_string());
        assert!(policy.should_retry(&err, 0));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
    }

    #[test]
    fn test_no_retry_for_cancellation_or_fatal() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&DownloadError::Paused, 0));
        assert!(!policy.should_retry(&DownloadError::Cancelled, 0));
        assert!(!policy.should_retry(&DownloadError::InvalidUrl("x".to_string()), 0));
        assert!(!policy.should_retry(&DownloadError::RangeIgnored, 0));
        assert!(!policy.should_retry(&DownloadError::SizeMismatch { expected: 1, actual: 0 }, 0));
    }

    #[test]
    fn test_delay_grows_but_stays_bounded() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        // 永远不超过上限
        assert_eq!(policy.delay_for(30), policy.max_delay);
    }

    #[test]
    fn test_context_counts_attempts() {
        let mut ctx = RetryContext::new(RetryPolicy::default());
        let err = DownloadError::Timeout;
        assert!(ctx.should_retry(&err));
        ctx.record_attempt();
        ctx.record_attempt();
        ctx.record_attempt();
        assert!(!ctx.should_retry(&err));
    }
}
