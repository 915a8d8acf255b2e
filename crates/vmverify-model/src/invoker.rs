//! Model invoker: deadline, backpressure, and bounded retry
//!
//! Provider calls share a per-process concurrency limit. A call first waits
//! for a slot; if the wait plus call would exceed the remaining deadline the
//! call fails fast with a timeout. Transient failures retry with exponential
//! backoff up to the configured cap, and the number of retries performed is
//! reported for the turn metrics.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};
use vmverify_utils::VerifyError;
use vmverify_utils::retry::BASE_DELAY;

use crate::bedrock::ModelClient;
use crate::types::{ModelRequest, ModelResult};

/// Result of an invocation plus the retry accounting the stages record.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub result: ModelResult,
    /// Number of retries performed (0 when the first call succeeded).
    pub retry_attempts: u32,
}

/// Shared invoker wrapping the provider client.
pub struct ModelInvoker {
    client: Arc<dyn ModelClient>,
    slots: Arc<Semaphore>,
    max_attempts: u32,
}

impl ModelInvoker {
    /// Create an invoker with the given concurrency limit and retry cap.
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>, concurrency: usize, max_attempts: u32) -> Self {
        Self {
            client,
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Invoke the model within `deadline`.
    ///
    /// The deadline covers the queue wait, every attempt, and the backoff
    /// between attempts; when it elapses the in-flight call is aborted and a
    /// `TIMEOUT_ERROR` is returned.
    pub async fn invoke(
        &self,
        request: &ModelRequest,
        deadline: Duration,
    ) -> Result<InvocationOutcome, VerifyError> {
        let expires_at = Instant::now() + deadline;

        let _permit = tokio::time::timeout_at(expires_at, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| {
                VerifyError::timeout(format!(
                    "queue wait for a model slot exceeded the {}s deadline",
                    deadline.as_secs()
                ))
            })?
            .map_err(|_| VerifyError::internal("model concurrency limiter closed"))?;

        let mut backoff = BASE_DELAY;
        let mut retry_attempts = 0u32;

        loop {
            let remaining = expires_at
                .checked_duration_since(Instant::now())
                .ok_or_else(|| VerifyError::timeout("model call deadline elapsed"))?;

            let attempt_result = tokio::time::timeout(remaining, self.client.invoke(request))
                .await
                .unwrap_or_else(|_| {
                    Err(VerifyError::timeout(format!(
                        "model call aborted after exceeding the {}s deadline",
                        deadline.as_secs()
                    ))
                    .retryable(false))
                });

            match attempt_result {
                Ok(result) => {
                    debug!(
                        retry_attempts,
                        latency_ms = result.latency_ms,
                        stop_reason = result.stop_reason.as_deref().unwrap_or(""),
                        "model invocation succeeded"
                    );
                    return Ok(InvocationOutcome {
                        result,
                        retry_attempts,
                    });
                }
                Err(err) if err.is_retryable() && retry_attempts + 1 < self.max_attempts => {
                    warn!(attempt = retry_attempts + 1, error = %err, "retrying model invocation");
                    retry_attempts += 1;
                    let now = Instant::now();
                    if now + backoff >= expires_at {
                        return Err(VerifyError::timeout(
                            "remaining deadline too short for another model attempt",
                        ));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    return Err(err.with_context("retryAttempts", retry_attempts.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModelClient;
    use crate::types::{ModelMessage, ModelRequest};

    fn request() -> ModelRequest {
        ModelRequest::new("system", 512).with_message(ModelMessage::user_text("hello"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_has_zero_retries() {
        let client = Arc::new(MockModelClient::with_text("Row A: Full"));
        let invoker = ModelInvoker::new(client.clone(), 2, 3);

        let outcome = invoker
            .invoke(&request(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(outcome.retry_attempts, 0);
        assert_eq!(outcome.result.content, "Row A: Full");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_throttles_then_success() {
        let client = Arc::new(MockModelClient::new());
        client.push_error(VerifyError::throttled("ThrottlingException"));
        client.push_error(VerifyError::throttled("ThrottlingException"));
        client.push_text("done");
        let invoker = ModelInvoker::new(client.clone(), 2, 5);

        let outcome = invoker
            .invoke(&request(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(outcome.retry_attempts, 2);
        assert_eq!(outcome.result.content, "done");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let client = Arc::new(MockModelClient::new());
        for _ in 0..5 {
            client.push_error(VerifyError::throttled("ThrottlingException"));
        }
        let invoker = ModelInvoker::new(client.clone(), 2, 3);

        let err = invoker
            .invoke(&request(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.code, "THROTTLED");
        assert_eq!(client.calls(), 3);
        assert_eq!(err.context.get("retryAttempts").map(String::as_str), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_no_retry() {
        let client = Arc::new(MockModelClient::new());
        client.push_error(VerifyError::model("ValidationException"));
        client.push_text("never reached");
        let invoker = ModelInvoker::new(client.clone(), 2, 3);

        let err = invoker
            .invoke(&request(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.code, "MODEL_ERROR");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_aborted_at_deadline() {
        let client = Arc::new(MockModelClient::new());
        client.set_delay(Duration::from_secs(120));
        client.push_text("too late");
        let invoker = ModelInvoker::new(client, 2, 3);

        let err = invoker
            .invoke(&request(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.code, "TIMEOUT_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_wait_fails_fast_past_deadline() {
        let client = Arc::new(MockModelClient::new());
        client.set_delay(Duration::from_secs(300));
        client.push_text("occupies the only slot");
        client.push_text("queued");
        let invoker = Arc::new(ModelInvoker::new(client, 1, 3));

        let occupier = {
            let invoker = invoker.clone();
            tokio::spawn(async move { invoker.invoke(&request(), Duration::from_secs(600)).await })
        };
        tokio::task::yield_now().await;

        let err = invoker
            .invoke(&request(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.code, "TIMEOUT_ERROR");
        assert!(err.message.contains("queue wait"));
        occupier.abort();
    }
}
