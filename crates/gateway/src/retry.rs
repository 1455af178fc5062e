//! Bounded retry with exponential backoff for non-streaming vendor calls.
//!
//! Streaming calls never go through this path: a mid-stream failure surfaces
//! to the caller immediately.

use std::{future::Future, time::Duration};

use crate::error::{GatewayError, Result};

/// Retry policy for one model executor.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base: the sleep before attempt `i + 1` is `base_delay * 2^i`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation` up to `max_attempts` times, strictly sequentially,
    /// sleeping between attempts. The terminal failure is an `Api` error
    /// wrapping the last underlying error.
    pub(crate) async fn run<F, Fut, T>(&self, model: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    log::warn!(
                        "attempt {}/{} failed for model {model}: {error}",
                        attempt + 1,
                        self.max_attempts
                    );
                    last_error = Some(error);

                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }

        let message = match last_error {
            Some(error) => format!("all {} attempts failed: {error}", self.max_attempts),
            None => format!("all {} attempts failed", self.max_attempts),
        };

        Err(GatewayError::api(message))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast_policy(3)
            .run("test-model", || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(GatewayError::api_status(500, "server error"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhaustion_runs_exactly_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<()> = fast_policy(3)
            .run("test-model", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::api_status(500, "server error"))
                }
            })
            .await;

        let error = result.unwrap_err();
        assert!(matches!(error, GatewayError::Api { status: None, .. }));
        assert!(error.to_string().contains("all 3 attempts failed"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(4).with_base_delay(Duration::from_millis(100));

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
