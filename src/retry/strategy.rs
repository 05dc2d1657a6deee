// src/retry/strategy.rs

use crate::config::RetryConfig;
use hyper::StatusCode;
use std::time::Duration;

/// Failover limits and pacing for one `forward` call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Upper bound on attempts: the first try plus `max_retries`, never
    /// more than the number of distinct instances.
    pub fn max_attempts(&self, instances: usize) -> usize {
        (self.config.max_retries as usize)
            .saturating_add(1)
            .min(instances)
    }

    /// Whether a response status should fail over to another instance.
    pub fn decide_status(&self, status: StatusCode) -> RetryDecision {
        if self.config.retryable_statuses.contains(&status.as_u16()) {
            RetryDecision::Retry
        } else {
            RetryDecision::NoRetry
        }
    }

    /// Delay before retry number `retry` (1-based). Zero base means no delay.
    ///
    /// Exponential: base * 2^(retry - 1), capped, plus up to 25% jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = self.config.backoff_base().as_millis() as u64;
        if base == 0 || retry == 0 {
            return Duration::ZERO;
        }
        let max = self.config.backoff_max().as_millis() as u64;

        let exponential = base.saturating_mul(2u64.saturating_pow(retry - 1));
        let capped = exponential.min(max);
        let jitter = (capped as f64 * rand::random::<f64>() * 0.25) as u64;

        Duration::from_millis(capped + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, base: u64, max: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            retryable_statuses: vec![502, 503, 504],
            backoff_base_ms: base,
            backoff_max_ms: max,
        })
    }

    #[test]
    fn attempts_bounded_by_retries_and_instances() {
        let p = policy(2, 0, 0);
        assert_eq!(p.max_attempts(3), 3);
        assert_eq!(p.max_attempts(10), 3);
        assert_eq!(p.max_attempts(1), 1);
        assert_eq!(p.max_attempts(0), 0);
        assert_eq!(policy(u32::MAX, 0, 0).max_attempts(4), 4);
    }

    #[test]
    fn only_configured_statuses_retry() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide_status(StatusCode::BAD_GATEWAY), RetryDecision::Retry);
        assert_eq!(p.decide_status(StatusCode::SERVICE_UNAVAILABLE), RetryDecision::Retry);
        assert_eq!(p.decide_status(StatusCode::GATEWAY_TIMEOUT), RetryDecision::Retry);
        assert_eq!(p.decide_status(StatusCode::INTERNAL_SERVER_ERROR), RetryDecision::NoRetry);
        assert_eq!(p.decide_status(StatusCode::NOT_FOUND), RetryDecision::NoRetry);
        assert_eq!(p.decide_status(StatusCode::OK), RetryDecision::NoRetry);
    }

    #[test]
    fn zero_base_means_immediate_failover() {
        assert_eq!(RetryPolicy::default().backoff(1), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy(5, 10, 40);
        let first = p.backoff(1);
        assert!(first >= Duration::from_millis(10) && first <= Duration::from_millis(13));

        let second = p.backoff(2);
        assert!(second >= Duration::from_millis(20) && second <= Duration::from_millis(25));

        let capped = p.backoff(6);
        assert!(capped >= Duration::from_millis(40) && capped <= Duration::from_millis(50));
    }
}
