//! PrepareSystemPrompt stage
//!
//! Renders the system prompt from the versioned template for the
//! verification type and persists it as `prompts/system-prompt.json`. The
//! machine's total position count is surfaced in the envelope summary for
//! the result computation downstream.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use vmverify_prompt::{EMBEDDED_VERSION, PromptKind, template_type_for};
use vmverify_store::Category;
use vmverify_types::{Envelope, VerificationStatus};
use vmverify_utils::VerifyError;

use crate::artifacts::SystemPromptArtifact;
use crate::stage::{
    Stage, StageDeps, StageName, build_template_context, load_context, persist_context,
};

pub struct PrepareSystemPromptStage;

#[async_trait]
impl Stage for PrepareSystemPromptStage {
    fn name(&self) -> StageName {
        StageName::PrepareSystemPrompt
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[VerificationStatus::ImagesFetched]
    }

    async fn run(&self, mut envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        let mut context = load_context(deps, &envelope).await?;
        let (template_context, structure) =
            build_template_context(deps, &envelope, &context).await?;

        let prompt = deps.prompts.render(
            PromptKind::System,
            context.verification_type,
            None,
            &template_context,
        )?;
        let artifact = SystemPromptArtifact {
            prompt,
            template_type: template_type_for(context.verification_type),
            template_version: EMBEDDED_VERSION.to_string(),
            rendered_at: Utc::now(),
        };
        deps.store
            .save_to_envelope(&mut envelope, Category::Prompts, "system-prompt", &artifact)
            .await?;

        let now = Utc::now();
        context.record_status(
            VerificationStatus::PromptPrepared,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, now),
            now,
        )?;
        persist_context(deps, &envelope, &context).await?;

        info!(
            verification_id = %context.verification_id,
            template_type = %artifact.template_type,
            total_positions = structure.total_positions(),
            "system prompt prepared"
        );
        envelope.summary.total_positions = Some(structure.total_positions());
        envelope.transition_to(VerificationStatus::PromptPrepared)?;
        Ok(envelope)
    }
}
