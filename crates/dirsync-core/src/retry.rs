//! Exponential backoff for transient API failures.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Retry policy for calls against the source and target APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Upper bound for a single delay, including `Retry-After` hints.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Self::default()
        }
    }

    /// A policy that never sleeps; for tests.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &SyncError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// `Retry-After` when the API sent one, otherwise
    /// `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &SyncError) -> Duration {
        let ms = if let SyncError::TransientApi {
            retry_after_secs: Some(secs),
            ..
        } = error
        {
            secs.saturating_mul(1_000)
        } else {
            self.base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt))
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Runs `f` until it succeeds, fails permanently, or retries run out.
    ///
    /// Exhausted transient failures surface as `MaxRetriesExceeded`.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.delay_for(attempt, &error);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) if error.is_retryable() => {
                    warn!(operation, attempts = attempt + 1, error = %error, "Retries exhausted");
                    return Err(SyncError::MaxRetriesExceeded {
                        operation: operation.to_string(),
                        attempts: attempt + 1,
                        message: error.to_string(),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }
}
