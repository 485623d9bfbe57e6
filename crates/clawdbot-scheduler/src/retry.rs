//! Retry policy for job bodies.
//!
//! Retryable errors (upstream, storage) get `max_retries` additional
//! attempts with a linearly growing delay; validation and authorization
//! errors fail immediately. Every attempt runs under the batch timeout.

use std::future::Future;
use std::time::Duration;

use clawdbot_core::config::BatchConfig;
use clawdbot_core::error::{BotError, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_batch(batch: &BatchConfig) -> Self {
        Self {
            max_retries: batch.max_retries,
            base_delay: Duration::from_secs(batch.retry_delay_secs),
            attempt_timeout: Duration::from_secs(batch.timeout_secs),
        }
    }

    /// Delay before retry attempt `n` (1-based): base, 2x base, 3x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` with timeout + retries. `op` is called fresh per attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.attempt_timeout, op())
                .await
                .unwrap_or_else(|_| {
                    Err(BotError::Upstream(format!("{label} timed out")))
                });

            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{label} attempt {attempt}/{} failed: {e}; retrying in {}s",
                        self.max_retries,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("job", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BotError::Upstream("flaky".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("job", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BotError::Validation("bad input".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("job", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BotError::Storage("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_linear_delay() {
        let p = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(300),
        };
        assert_eq!(p.delay_for(1), Duration::from_secs(60));
        assert_eq!(p.delay_for(3), Duration::from_secs(180));
    }
}
