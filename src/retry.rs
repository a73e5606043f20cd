//! Bounded retry with exponential backoff for capability calls
//!
//! Embedding, reranking and LLM calls are slow external operations that may
//! fail transiently. Every call site wraps them in a [`RetryPolicy`] so the
//! attempt budget and per-attempt timeout come from one place.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio::time::{sleep, timeout};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {last_error:#}")]
pub struct RetryExhausted {
    pub operation: String,
    pub attempts: u32,
    pub last_error: anyhow::Error,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            timeout,
        }
    }

    /// Single attempt, no waiting. Used by tests and offline backends.
    pub fn immediate() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            timeout: Duration::from_secs(60),
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.delay_before(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying capability call"
                );
                sleep(delay).await;
            }

            match timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    tracing::warn!(operation, attempt, error = %err, "Capability call failed");
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Capability call timed out"
                    );
                    last_error = Some(anyhow!(
                        "timed out after {} ms",
                        self.timeout.as_millis()
                    ));
                }
            }
        }

        Err(RetryExhausted {
            operation: operation.to_string(),
            attempts,
            last_error: last_error.unwrap_or_else(|| anyhow!("no attempt was made")),
        })
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt 2 waits base, attempt 3 waits 2*base, ...
        let exponent = attempt.saturating_sub(2).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(3);

        let value = policy
            .run("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(anyhow!("transient {n}"))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(3);

        let err = policy
            .run("always_down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow!("model unavailable"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("model unavailable"));
        assert!(err.to_string().contains("always_down"));
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5));

        let err = policy
            .run("slow", || async {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(400));
        assert!(policy.delay_before(30) <= MAX_BACKOFF);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }
}
