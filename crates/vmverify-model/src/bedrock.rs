//! Bedrock runtime client
//!
//! Serializes the messages body, invokes the model, and parses the provider
//! envelope. Failure classification drives the retry policy: throttling,
//! timeouts, service unavailability, connection resets, and endpoint
//! resolution failures are transient; invalid requests, unsupported media,
//! and authentication failures are permanent.

use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;
use vmverify_utils::VerifyError;

use crate::types::{ModelRequest, ModelResult, ProviderEnvelope};

/// Provider surface used by the invoker.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Perform one model call. The caller enforces the deadline.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResult, VerifyError>;
}

/// Bedrock-runtime-backed client.
pub struct BedrockModelClient {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
}

impl BedrockModelClient {
    #[must_use]
    pub fn new(client: aws_sdk_bedrockruntime::Client, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    /// Build the SDK client from the ambient AWS environment.
    pub async fn from_environment(
        model_id: impl Into<String>,
        region: Option<String>,
        endpoint_override: Option<String>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(endpoint) = endpoint_override {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        Self::new(aws_sdk_bedrockruntime::Client::new(&shared), model_id)
    }
}

#[async_trait]
impl ModelClient for BedrockModelClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResult, VerifyError> {
        request.validate()?;
        let body = serde_json::to_vec(request).map_err(|err| {
            VerifyError::internal(format!("model request failed to serialize: {err}"))
        })?;

        debug!(model_id = %self.model_id, messages = request.messages.len(), "invoking model");
        let started = Instant::now();
        let output = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(aws_sdk_bedrockruntime::primitives::Blob::new(body))
            .send()
            .await
            .map_err(|err| classify_provider_error(&self.model_id, &err.to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let envelope: ProviderEnvelope =
            serde_json::from_slice(output.body.as_ref()).map_err(|err| {
                VerifyError::model(format!("provider response is not valid JSON: {err}"))
            })?;
        ModelResult::from_envelope(envelope, latency_ms)
    }
}

/// Map a rendered SDK error onto the pipeline taxonomy.
fn classify_provider_error(model_id: &str, rendered: &str) -> VerifyError {
    let base = format!("model '{model_id}' invocation failed: {rendered}");
    let error = if rendered.contains("ThrottlingException") || rendered.contains("TooManyRequests") {
        VerifyError::throttled(base)
    } else if rendered.contains("ModelTimeoutException")
        || rendered.contains("timeout")
        || rendered.contains("timed out")
    {
        VerifyError::timeout(base)
    } else if rendered.contains("ServiceUnavailable")
        || rendered.contains("InternalServer")
        || rendered.contains("connection reset")
        || rendered.contains("dispatch failure")
        || rendered.contains("dns error")
        || rendered.contains("failed to resolve")
    {
        VerifyError::model(base).retryable(true)
    } else {
        // ValidationException, AccessDeniedException, unsupported media, and
        // anything unrecognized are permanent.
        VerifyError::model(base)
    };
    error.with_context("modelId", model_id)
}
