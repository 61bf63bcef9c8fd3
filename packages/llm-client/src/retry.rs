//! Retry policy for transient provider failures.

use std::time::Duration;

use tracing::warn;

use crate::error::{LlmError, Result};

/// Exponential backoff policy.
///
/// Delays double from `base_delay` per attempt (1s, 2s, 4s, 8s, 16s with
/// the defaults). Rate-limit errors that advertise a Retry-After wait for
/// that instead of the computed delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (default 5)
    pub max_attempts: u32,
    /// Delay before the first retry (default 1s)
    pub base_delay: Duration,
    /// Ceiling for computed delays (default 16s)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails non-retryably, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.delay_for_attempt(attempt));
                    warn!(
                        label = %label,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient LLM failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if attempt >= self.max_attempts && err.is_retryable() => {
                    return Err(LlmError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(16));
        // Capped thereafter
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(LlmError::Auth {
                        provider: Provider::OpenAi,
                        message: "nope".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(LlmError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = std::sync::Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let calls_ref = calls.clone();
        let result = policy
            .run("test", move || {
                let calls = calls_ref.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(LlmError::Timeout {
                            provider: Provider::OpenAi,
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };

        let result: Result<()> = policy
            .run("test", || async {
                Err(LlmError::Timeout {
                    provider: Provider::Gemini,
                })
            })
            .await;

        match result {
            Err(LlmError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LlmError::Timeout { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
