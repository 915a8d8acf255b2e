//! Shared plumbing for the two model turns

use chrono::{DateTime, Utc};
use vmverify_model::InvocationOutcome;
use vmverify_types::{Envelope, ImageMetadata, VerificationContext};
use vmverify_utils::VerifyError;

use crate::artifacts::SystemPromptArtifact;
use crate::stage::{StageDeps, elapsed_ms, refs};

/// Load the rendered system prompt.
pub async fn load_system_prompt(
    deps: &StageDeps,
    envelope: &Envelope,
) -> Result<String, VerifyError> {
    let reference = envelope.reference(refs::SYSTEM_PROMPT)?;
    let artifact: SystemPromptArtifact = deps.store.retrieve_json(Some(reference)).await?;
    Ok(artifact.prompt)
}

/// Load the combined image metadata.
pub async fn load_image_metadata(
    deps: &StageDeps,
    envelope: &Envelope,
) -> Result<ImageMetadata, VerifyError> {
    let reference = envelope.reference(refs::IMAGE_METADATA)?;
    deps.store.retrieve_json(Some(reference)).await
}

/// Load a stored base64 payload as a string.
pub async fn load_base64(
    deps: &StageDeps,
    envelope: &Envelope,
    reference_name: &str,
) -> Result<String, VerifyError> {
    let reference = envelope.reference(reference_name)?;
    let bytes = deps.store.retrieve(Some(reference)).await?;
    String::from_utf8(bytes).map_err(|_| {
        VerifyError::internal(format!(
            "base64 artifact '{reference_name}' is not valid UTF-8"
        ))
    })
}

/// Record the timing and usage metrics for one turn.
pub fn apply_turn_metrics(
    context: &mut VerificationContext,
    turn: u8,
    started: DateTime<Utc>,
    ended: DateTime<Utc>,
    outcome: &InvocationOutcome,
) -> Result<(), VerifyError> {
    let total_time_ms = elapsed_ms(started, ended);
    let metrics = context.turn_metrics_mut(turn)?;
    metrics.start_time = Some(started);
    metrics.end_time = Some(ended);
    metrics.total_time_ms = total_time_ms;
    metrics.bedrock_latency_ms = outcome.result.latency_ms;
    metrics.processing_time_ms = total_time_ms.saturating_sub(outcome.result.latency_ms);
    metrics.retry_attempts = outcome.retry_attempts;
    metrics.token_usage = Some(outcome.result.token_usage);
    Ok(())
}

/// Accumulate the turn's token total into the envelope summary.
pub fn add_token_usage(envelope: &mut Envelope, total_tokens: u64) {
    let current = envelope.summary.token_usage_total.unwrap_or(0);
    envelope.summary.token_usage_total = Some(current + total_tokens);
}
