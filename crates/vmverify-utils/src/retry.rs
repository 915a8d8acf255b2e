//! Bounded retry with exponential backoff
//!
//! Base delay 100 ms, doubling per attempt, at most `max_attempts` tries.
//! Only errors flagged retryable are retried; the last error is returned on
//! exhaustion.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::VerifyError;

/// Initial backoff delay.
pub const BASE_DELAY: Duration = Duration::from_millis(100);

/// Default attempt cap for state-store operations.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Run `operation` with bounded exponential backoff.
pub async fn with_backoff<T, F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, VerifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VerifyError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = BASE_DELAY;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                debug!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => {
                return Err(err.with_context("operation", operation_name).with_context(
                    "attempts",
                    attempt.to_string(),
                ));
            }
        }
    }
}
