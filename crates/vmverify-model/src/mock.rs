//! Scripted model client for tests
//!
//! Returns queued outcomes in order, then a fallback text if configured. An
//! optional artificial delay exercises deadline handling.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use vmverify_utils::VerifyError;

use crate::bedrock::ModelClient;
use crate::types::{ModelRequest, ModelResult, ProviderEnvelope, ProviderUsage, ResponseContentBlock};

/// Deterministic token counts reported by the mock.
pub const MOCK_INPUT_TOKENS: u64 = 1200;
/// Deterministic output token count reported by the mock.
pub const MOCK_OUTPUT_TOKENS: u64 = 300;

#[derive(Default)]
pub struct MockModelClient {
    script: Mutex<Vec<Result<String, VerifyError>>>,
    fallback_text: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    calls: AtomicU32,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockModelClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that always succeeds with the given text.
    #[must_use]
    pub fn with_text(text: impl Into<String>) -> Self {
        let client = Self::default();
        *client.fallback_text.lock().expect("lock poisoned") = Some(text.into());
        client
    }

    /// Queue a successful response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .expect("lock poisoned")
            .push(Ok(text.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: VerifyError) {
        self.script.lock().expect("lock poisoned").push(Err(error));
    }

    /// Delay every call by `delay` before resolving.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("lock poisoned") = delay;
    }

    /// Number of calls performed.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests observed, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    fn next_outcome(&self) -> Result<String, VerifyError> {
        let mut script = self.script.lock().expect("lock poisoned");
        if !script.is_empty() {
            return script.remove(0);
        }
        drop(script);
        self.fallback_text
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| VerifyError::internal("mock model script exhausted"))
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResult, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("lock poisoned")
            .push(request.clone());

        let delay = *self.delay.lock().expect("lock poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let text = self.next_outcome()?;
        let raw = ProviderEnvelope {
            content: vec![ResponseContentBlock {
                block_type: "text".to_string(),
                text: Some(text),
            }],
            stop_reason: Some("end_turn".to_string()),
            usage: Some(ProviderUsage {
                input_tokens: MOCK_INPUT_TOKENS,
                output_tokens: MOCK_OUTPUT_TOKENS,
            }),
        };
        ModelResult::from_envelope(raw, 850)
    }
}
