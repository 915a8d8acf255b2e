//! ExecuteTurn2 stage
//!
//! Second model exchange: the turn-1 conversation is replayed (reference
//! image + prompt, assistant analysis) and the checking image is appended
//! with the turn-2 prompt. The JSON response is parsed into structured
//! discrepancies.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use vmverify_model::{ModelMessage, ModelRequest};
use vmverify_prompt::PromptKind;
use vmverify_store::Category;
use vmverify_types::{Envelope, VerificationStatus};
use vmverify_utils::VerifyError;

use crate::artifacts::{
    RecordedBlock, RecordedMessage, Turn1Processed, Turn2Processed, TurnPromptArtifact,
};
use crate::parsing::parse_turn2_response;
use crate::stage::{
    MODEL_DEADLINE, Stage, StageDeps, StageName, build_template_context, load_context,
    persist_context, refs,
};
use crate::stages::turn_common::{
    add_token_usage, apply_turn_metrics, load_base64, load_image_metadata, load_system_prompt,
};

pub struct ExecuteTurn2Stage;

#[async_trait]
impl Stage for ExecuteTurn2Stage {
    fn name(&self) -> StageName {
        StageName::ExecuteTurn2
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[VerificationStatus::Turn1Completed]
    }

    async fn run(&self, mut envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        let mut context = load_context(deps, &envelope).await?;
        let system = load_system_prompt(deps, &envelope).await?;
        let metadata = load_image_metadata(deps, &envelope).await?;
        let reference_b64 = load_base64(deps, &envelope, refs::REFERENCE_BASE64).await?;
        let checking_b64 = load_base64(deps, &envelope, refs::CHECKING_BASE64).await?;
        let turn1: Turn1Processed = deps
            .store
            .retrieve_json(Some(envelope.reference(refs::TURN1_PROCESSED)?))
            .await?;
        let (template_context, _) = build_template_context(deps, &envelope, &context).await?;

        let turn1_prompt =
            deps.prompts
                .render(PromptKind::Turn1, context.verification_type, None, &template_context)?;
        let turn2_prompt =
            deps.prompts
                .render(PromptKind::Turn2, context.verification_type, None, &template_context)?;

        let request = ModelRequest::new(system.clone(), deps.config.max_tokens)
            .with_message(ModelMessage::user_with_image(
                metadata.reference_image.format,
                reference_b64,
                turn1_prompt.clone(),
            )?)
            .with_message(ModelMessage::assistant_text(turn1.content.clone()))
            .with_message(ModelMessage::user_with_image(
                metadata.checking_image.format,
                checking_b64,
                turn2_prompt.clone(),
            )?);

        let prompt_artifact = TurnPromptArtifact {
            turn: 2,
            system,
            messages: vec![
                RecordedMessage {
                    role: "user".to_string(),
                    content: vec![
                        RecordedBlock::ImageReference {
                            media_type: metadata.reference_image.content_type.clone(),
                            artifact_key: metadata.reference_image.base64_key.clone(),
                        },
                        RecordedBlock::Text { text: turn1_prompt },
                    ],
                },
                RecordedMessage {
                    role: "assistant".to_string(),
                    content: vec![RecordedBlock::Text {
                        text: turn1.content,
                    }],
                },
                RecordedMessage {
                    role: "user".to_string(),
                    content: vec![
                        RecordedBlock::ImageReference {
                            media_type: metadata.checking_image.content_type.clone(),
                            artifact_key: metadata.checking_image.base64_key.clone(),
                        },
                        RecordedBlock::Text { text: turn2_prompt },
                    ],
                },
            ],
            max_tokens: request.max_tokens,
            anthropic_version: request.anthropic_version.clone(),
            recorded_at: Utc::now(),
        };
        deps.store
            .save_to_envelope(&mut envelope, Category::Prompts, "turn2-prompt", &prompt_artifact)
            .await?;

        let turn_started = Utc::now();
        context.turn_timestamps.turn2_started_at = Some(turn_started);
        context.record_status(
            VerificationStatus::Turn2Started,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, turn_started),
            turn_started,
        )?;
        persist_context(deps, &envelope, &context).await?;
        envelope.transition_to(VerificationStatus::Turn2Started)?;

        let outcome = deps.invoker.invoke(&request, MODEL_DEADLINE).await?;

        deps.store
            .save_to_envelope(
                &mut envelope,
                Category::Responses,
                "turn2-raw-response",
                &outcome.result.raw,
            )
            .await?;

        let payload = parse_turn2_response(&outcome.result.content)?;
        let count = payload.discrepancies.len() as u32;
        if let Some(reported) = payload.total_discrepancies {
            if reported != count {
                warn!(
                    reported,
                    parsed = count,
                    "model-reported totalDiscrepancies disagrees with the parsed list; using the list"
                );
            }
        }
        let severity = payload.severity.unwrap_or_else(|| {
            payload
                .discrepancies
                .iter()
                .map(|d| d.severity.as_str())
                .max_by_key(|s| severity_rank(s))
                .unwrap_or("NONE")
                .to_string()
        });

        let turn_ended = Utc::now();
        let processed = Turn2Processed {
            content: outcome.result.content.clone(),
            token_usage: outcome.result.token_usage,
            discrepancies: payload.discrepancies,
            total_discrepancies: count,
            severity,
            processed_at: turn_ended,
        };
        deps.store
            .save_to_envelope(
                &mut envelope,
                Category::Processing,
                "turn2-processed-response",
                &processed,
            )
            .await?;

        apply_turn_metrics(&mut context, 2, turn_started, turn_ended, &outcome)?;
        context.turn_timestamps.turn2_completed_at = Some(turn_ended);
        context.record_status(
            VerificationStatus::Turn2Completed,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, turn_ended),
            turn_ended,
        )?;
        persist_context(deps, &envelope, &context).await?;

        info!(
            verification_id = %context.verification_id,
            discrepancies = count,
            retry_attempts = outcome.retry_attempts,
            "turn 2 completed"
        );
        add_token_usage(&mut envelope, outcome.result.token_usage.total_tokens);
        envelope.summary.discrepancy_count = Some(count);
        envelope.transition_to(VerificationStatus::Turn2Completed)?;
        Ok(envelope)
    }
}

fn severity_rank(severity: &str) -> u8 {
    match severity {
        "HIGH" => 3,
        "MEDIUM" => 2,
        "LOW" => 1,
        _ => 0,
    }
}
