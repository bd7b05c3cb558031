use crate::error::Result;
use crate::utils::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Bounded retries with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or has been retried `max_retries` times. The last error is returned.
    pub async fn run<T, F, Fut>(&self, stage: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    error!(stage, attempts = attempt + 1, error = %e, "Stage failed, giving up");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    warn!(
                        stage,
                        attempt,
                        max_retries = self.max_retries,
                        delay_secs = self.delay.as_secs(),
                        error = %e,
                        "Stage failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        )
    }
}
