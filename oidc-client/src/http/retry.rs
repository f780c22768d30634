//! Backoff for transient backchannel failures.

use std::time::{Duration, SystemTime};

use reqwest_retry::{RetryDecision, RetryPolicy};

/// Exponential backoff bounded by a retry count and, optionally, a time budget.
///
/// The budget is measured from the first attempt, so a flow never waits on retries longer
/// than its backchannel timeout. Zero retries disables retrying altogether.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    budget: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            budget: None,
        }
    }

    /// Stop retrying once the next attempt would start after `budget` has elapsed.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    fn delay(&self, n_past_retries: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * 2_f64.powi(n_past_retries as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

impl RetryPolicy for BackoffPolicy {
    fn should_retry(&self, request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_retries {
            return RetryDecision::DoNotRetry;
        }

        let execute_after = SystemTime::now() + self.delay(n_past_retries);
        match self.budget {
            Some(budget) if execute_after > request_start_time + budget => RetryDecision::DoNotRetry,
            _ => RetryDecision::Retry { execute_after },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retries(decision: RetryDecision) -> bool {
        matches!(decision, RetryDecision::Retry { .. })
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let policy = BackoffPolicy::new(3);
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(12), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_retries_never_retries() {
        let policy = BackoffPolicy::new(0);
        assert!(!retries(policy.should_retry(SystemTime::now(), 0)));
    }

    #[test]
    fn test_retry_count_is_bounded() {
        let policy = BackoffPolicy::new(2);
        assert!(retries(policy.should_retry(SystemTime::now(), 1)));
        assert!(!retries(policy.should_retry(SystemTime::now(), 2)));
    }

    #[test]
    fn test_budget_stops_retries() {
        let policy = BackoffPolicy::new(5).with_budget(Duration::from_secs(1));
        let started = SystemTime::now();
        assert!(retries(policy.should_retry(started, 0)));
        // the third retry would wait 2s, past the 1s budget
        assert!(!retries(policy.should_retry(started, 2)));
    }
}
