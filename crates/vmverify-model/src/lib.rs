//! Multimodal model invocation
//!
//! Builds Anthropic-messages requests with inline images, invokes the
//! provider through the Bedrock runtime, classifies failures for the retry
//! policy, and enforces the per-process concurrency limit with fail-fast
//! deadline handling.

pub mod bedrock;
pub mod invoker;
pub mod mock;
pub mod types;

pub use bedrock::{BedrockModelClient, ModelClient};
pub use invoker::{InvocationOutcome, ModelInvoker};
pub use mock::MockModelClient;
pub use types::{
    ANTHROPIC_VERSION, ContentBlock, ImageSource, ModelMessage, ModelRequest, ModelResult,
    ProviderEnvelope, ProviderUsage, ResponseContentBlock,
};
