//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::{AttemptError, FetchError};

/// Retry contract shared by every fetcher.
///
/// Attempt `i` (0-based) that fails and is not the last is followed by a
/// sleep of `base_delay * 2^i`. Each attempt is cut off after
/// `attempt_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempt_timeout,
        }
    }

    /// Backoff slept after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Total time spent sleeping when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.max(1) - 1)
            .map(|i| self.delay_for(i))
            .sum()
    }

    /// Run `attempt` until it succeeds or the policy is exhausted.
    ///
    /// The closure receives the 0-based attempt index and must build all
    /// per-attempt state itself so that nothing leaks between attempts.
    pub async fn run<T, F, Fut>(&self, url: &str, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut index = 0;

        loop {
            let outcome = match tokio::time::timeout(self.attempt_timeout, attempt(index)).await {
                Ok(result) => result,
                Err(_) => Err(AttemptError::Timeout(self.attempt_timeout)),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            warn!(
                "Attempt {}/{} for {} failed: {}",
                index + 1,
                max_attempts,
                url,
                error
            );

            if index + 1 >= max_attempts {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: max_attempts,
                    last_error: error,
                });
            }

            let delay = self.delay_for(index);
            debug!("Retrying {} in {:?}", url, delay);
            tokio::time::sleep(delay).await;
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.total_backoff(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), FetchError> = policy
            .run("https://example.test", |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::Status(502))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        match result {
            Err(FetchError::Exhausted {
                attempts,
                last_error: AttemptError::Status(502),
                ..
            }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let policy = RetryPolicy::default();

        let result = policy
            .run("https://example.test", |attempt| async move {
                if attempt == 0 {
                    Err(AttemptError::Transport("connection reset".to_string()))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out_and_retries() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(60));
        let started = Instant::now();

        let result: Result<(), FetchError> = policy
            .run("https://example.test", |_| async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::Exhausted {
                last_error: AttemptError::Timeout(_),
                ..
            })
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(121));
    }
}
