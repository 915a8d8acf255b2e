//! Model request and response types
//!
//! Requests follow the Anthropic messages shape carried over the Bedrock
//! runtime: a system prompt, a message list whose user turns may inline
//! base64 images, a token budget, and the protocol version marker.

use serde::{Deserialize, Serialize};
use vmverify_types::{ImageFormat, TokenUsage};
use vmverify_utils::VerifyError;

/// Protocol version sent with every request.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// One content block of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Image { source: ImageSource },
    Text { text: String },
}

/// Inline base64 image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    /// Build an inline image source; rejects formats the model does not
    /// accept.
    pub fn base64(format: ImageFormat, data: impl Into<String>) -> Result<Self, VerifyError> {
        Ok(Self {
            source_type: "base64".to_string(),
            media_type: format.model_mime_type()?.to_string(),
            data: data.into(),
        })
    }
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    /// User turn carrying an inline image followed by prompt text.
    pub fn user_with_image(
        format: ImageFormat,
        base64_data: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, VerifyError> {
        Ok(Self {
            role: "user".to_string(),
            content: vec![
                ContentBlock::Image {
                    source: ImageSource::base64(format, base64_data)?,
                },
                ContentBlock::Text { text: text.into() },
            ],
        })
    }

    /// Plain-text user turn.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Assistant turn echoing earlier model output.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// Full request body for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub anthropic_version: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
}

impl ModelRequest {
    #[must_use]
    pub fn new(system: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            max_tokens,
            system: Some(system.into()),
            messages: Vec::new(),
        }
    }

    /// Append a message.
    #[must_use]
    pub fn with_message(mut self, message: ModelMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Validate the request before dispatch.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.messages.is_empty() {
            return Err(VerifyError::validation("model request has no messages"));
        }
        if self.max_tokens == 0 {
            return Err(VerifyError::validation("model request maxTokens must be > 0"));
        }
        Ok(())
    }
}

/// Raw provider envelope persisted to `responses/turn{N}-raw-response.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEnvelope {
    pub content: Vec<ResponseContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ProviderUsage>,
}

/// One content block of the provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Parsed result of one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResult {
    /// Concatenated text content.
    pub content: String,
    pub stop_reason: Option<String>,
    pub token_usage: TokenUsage,
    /// Provider-side latency of this call.
    pub latency_ms: u64,
    /// Raw provider envelope for artifact persistence.
    pub raw: ProviderEnvelope,
}

impl ModelResult {
    /// Extract the text and usage from a provider envelope.
    pub fn from_envelope(raw: ProviderEnvelope, latency_ms: u64) -> Result<Self, VerifyError> {
        let content: String = raw
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            return Err(VerifyError::model("provider response carries no text content"));
        }
        let token_usage = raw
            .usage
            .map(|usage| TokenUsage::new(usage.input_tokens, usage.output_tokens))
            .unwrap_or_default();
        Ok(Self {
            content,
            stop_reason: raw.stop_reason.clone(),
            token_usage,
            latency_ms,
            raw,
        })
    }
}
