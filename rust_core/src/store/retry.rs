//! Retry logic for transient backend failures
//!
//! Provides automatic retry with exponential backoff for pick store writes and reads.

use super::backend::BackendError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_backoff_ms.saturating_mul(exp).min(self.max_backoff_ms))
    }
}

/// Execute a backend operation with automatic retry on transient failures
///
/// # Example
/// ```ignore
/// let record = execute_with_retry(
///     || backend.replace(&record),
///     RetryPolicy::default(),
/// ).await?;
/// ```
pub async fn execute_with_retry<F, Fut, T>(mut f: F, policy: RetryPolicy) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && e.is_retriable() => {
                let backoff = policy.backoff(attempt);
                warn!(
                    "Pick backend operation failed (attempt {}/{}): {}. Retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
