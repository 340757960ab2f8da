// =============================================================================
// RETRY POLICY
// =============================================================================
//
// Two places in the client need retry timing:
//
// 1. Reporting calls (complete, failure, ...) that fail with a transient
//    transport error are re-sent a bounded number of times (`retry_with_policy`).
// 2. A handler that returns an error is turned into an implicit failure
//    report. The remaining retries and the `retryTimeout` sent to the engine
//    come from the subscription's policy (`RetryPolicy::failure_report`).
//
// Which errors are worth retrying is decided by the `Retryable` trait.
//
// =============================================================================

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Backoff schedule for retried operations.
///
/// Attempts are numbered from 1. The delay after attempt `n` is
/// `initial_delay * backoff_multiplier^(n-1)`, capped at `max_delay`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    #[serde(with = "millis")]
    pub initial_delay: Duration,

    #[serde(with = "millis")]
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub const NONE: Self = Self {
        max_attempts: 1,
        initial_delay: Duration::from_secs(0),
        max_delay: Duration::from_secs(0),
        backoff_multiplier: 1.0,
    };

    /// Three attempts, 1s doubling up to 30s.
    pub const STANDARD: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    pub const fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Returns the delay before the attempt following `attempt`, or `None`
    /// once the attempts are exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let exponent = (attempt - 1) as f64;
        let multiplier = self.backoff_multiplier.powf(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Some(Duration::from_secs_f64(
            delay_secs.min(self.max_delay.as_secs_f64()),
        ))
    }

    /// Computes `(retries, retry_timeout)` for an implicit failure report.
    ///
    /// `current_retries` is the task's remaining retry count as seen on fetch;
    /// `None` means the task has never failed, in which case the policy's
    /// attempt budget seeds the counter. At zero remaining retries the
    /// timeout is zero, the task becomes an incident.
    pub fn failure_report(&self, current_retries: Option<i32>) -> (i32, Duration) {
        let budget = i32::try_from(self.max_attempts).unwrap_or(i32::MAX);
        let retries = match current_retries {
            Some(r) => (r - 1).max(0),
            None => (budget - 1).max(0),
        };
        if retries == 0 {
            return (0, Duration::ZERO);
        }
        let attempt = u32::try_from((budget - retries).max(1)).unwrap_or(1);
        let timeout = self
            .delay_for_attempt(attempt)
            .unwrap_or(self.initial_delay);
        (retries, timeout)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// =============================================================================
// RETRYABLE ERRORS
// =============================================================================

/// Classifies an error as transient (worth retrying) or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

// =============================================================================
// RETRY EXECUTION
// =============================================================================

/// Runs `operation` until it succeeds, fails permanently, or the policy runs
/// out of attempts. The closure receives the current attempt number.
pub async fn retry_with_policy<F, Fut, T, E>(
    retry_policy: Option<RetryPolicy>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Debug,
{
    let Some(policy) = retry_policy else {
        return operation(1).await;
    };

    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() {
                    tracing::debug!("Operation failed with non-retryable error: {:?}", error);
                    return Err(error);
                }
                match policy.delay_for_attempt(attempt) {
                    Some(delay) => {
                        tracing::debug!(
                            "Operation failed with retryable error (attempt {}/{}): {:?}. Retrying after {:?}",
                            attempt,
                            policy.max_attempts,
                            error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::warn!(
                            "Operation failed and exhausted retry attempts ({}/{}): {:?}",
                            attempt,
                            policy.max_attempts,
                            error
                        );
                        return Err(error);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::NONE;
        assert_eq!(policy.delay_for_attempt(1), None);
        assert_eq!(policy.delay_for_attempt(2), None);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(6), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(0), None);
    }

    #[test]
    fn test_failure_report_seeds_from_policy() {
        let policy = RetryPolicy::STANDARD;
        assert_eq!(policy.failure_report(None), (2, Duration::from_secs(1)));
        assert_eq!(policy.failure_report(Some(2)), (1, Duration::from_secs(2)));
        assert_eq!(policy.failure_report(Some(1)), (0, Duration::ZERO));
        assert_eq!(policy.failure_report(Some(0)), (0, Duration::ZERO));
    }

    #[test]
    fn test_policy_deserializes_millis() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"max_attempts":4,"initial_delay":250,"max_delay":1000,"backoff_multiplier":2.0}"#,
        )
        .unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry_with_policy(Some(RetryPolicy::STANDARD), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Flaky(true))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = retry_with_policy(Some(RetryPolicy::STANDARD), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = retry_with_policy(Some(RetryPolicy::STANDARD), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(true)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
