//! ExecuteTurn1 stage
//!
//! First model exchange: system prompt + reference image + turn-1 prompt.
//! The model's free-text row-by-row analysis is parsed into the reference
//! analysis map and persisted alongside the raw provider envelope.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use vmverify_model::{ModelMessage, ModelRequest};
use vmverify_prompt::PromptKind;
use vmverify_store::Category;
use vmverify_types::{Envelope, VerificationStatus};
use vmverify_utils::VerifyError;

use crate::artifacts::{RecordedBlock, RecordedMessage, Turn1Processed, TurnPromptArtifact};
use crate::parsing::parse_reference_analysis;
use crate::stage::{
    MODEL_DEADLINE, Stage, StageDeps, StageName, build_template_context, load_context,
    persist_context, refs,
};
use crate::stages::turn_common::{
    add_token_usage, apply_turn_metrics, load_base64, load_image_metadata, load_system_prompt,
};

pub struct ExecuteTurn1Stage;

#[async_trait]
impl Stage for ExecuteTurn1Stage {
    fn name(&self) -> StageName {
        StageName::ExecuteTurn1
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[VerificationStatus::PromptPrepared]
    }

    async fn run(&self, mut envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        let mut context = load_context(deps, &envelope).await?;
        let system = load_system_prompt(deps, &envelope).await?;
        let metadata = load_image_metadata(deps, &envelope).await?;
        let reference_b64 = load_base64(deps, &envelope, refs::REFERENCE_BASE64).await?;
        let (template_context, _) = build_template_context(deps, &envelope, &context).await?;

        let turn1_prompt =
            deps.prompts
                .render(PromptKind::Turn1, context.verification_type, None, &template_context)?;
        let request = ModelRequest::new(system.clone(), deps.config.max_tokens).with_message(
            ModelMessage::user_with_image(
                metadata.reference_image.format,
                reference_b64,
                turn1_prompt.clone(),
            )?,
        );

        let prompt_artifact = TurnPromptArtifact {
            turn: 1,
            system,
            messages: vec![RecordedMessage {
                role: "user".to_string(),
                content: vec![
                    RecordedBlock::ImageReference {
                        media_type: metadata.reference_image.content_type.clone(),
                        artifact_key: metadata.reference_image.base64_key.clone(),
                    },
                    RecordedBlock::Text {
                        text: turn1_prompt,
                    },
                ],
            }],
            max_tokens: request.max_tokens,
            anthropic_version: request.anthropic_version.clone(),
            recorded_at: Utc::now(),
        };
        deps.store
            .save_to_envelope(&mut envelope, Category::Prompts, "turn1-prompt", &prompt_artifact)
            .await?;

        let turn_started = Utc::now();
        context.turn_timestamps.turn1_started_at = Some(turn_started);
        context.record_status(
            VerificationStatus::Turn1Started,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, turn_started),
            turn_started,
        )?;
        persist_context(deps, &envelope, &context).await?;
        envelope.transition_to(VerificationStatus::Turn1Started)?;

        let outcome = deps.invoker.invoke(&request, MODEL_DEADLINE).await?;

        deps.store
            .save_to_envelope(
                &mut envelope,
                Category::Responses,
                "turn1-raw-response",
                &outcome.result.raw,
            )
            .await?;

        let reference_analysis = parse_reference_analysis(&outcome.result.content);
        let turn_ended = Utc::now();
        let processed = Turn1Processed {
            content: outcome.result.content.clone(),
            token_usage: outcome.result.token_usage,
            reference_analysis,
            processed_at: turn_ended,
        };
        deps.store
            .save_to_envelope(
                &mut envelope,
                Category::Processing,
                "turn1-processed-response",
                &processed,
            )
            .await?;

        apply_turn_metrics(&mut context, 1, turn_started, turn_ended, &outcome)?;
        context.turn_timestamps.turn1_completed_at = Some(turn_ended);
        context.record_status(
            VerificationStatus::Turn1Completed,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, turn_ended),
            turn_ended,
        )?;
        persist_context(deps, &envelope, &context).await?;

        info!(
            verification_id = %context.verification_id,
            rows_parsed = processed.reference_analysis.len(),
            retry_attempts = outcome.retry_attempts,
            "turn 1 completed"
        );
        add_token_usage(&mut envelope, outcome.result.token_usage.total_tokens);
        envelope.transition_to(VerificationStatus::Turn1Completed)?;
        Ok(envelope)
    }
}
