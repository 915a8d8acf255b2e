//! StoreResults stage
//!
//! Projects the finished verification into the key-value tables: one row in
//! the verifications table with artifact paths embedded as references, and
//! one row in the conversations table pointing at the processed turn
//! artifacts. Both writes are idempotent on the natural composite key.

use async_trait::async_trait;
use tracing::info;
use vmverify_repository::{ConversationRow, VerificationRow};
use vmverify_types::{
    Envelope, LayoutMetadata, TokenUsage, VerificationResults, VerificationStatus,
};
use vmverify_utils::VerifyError;

use crate::stage::{Stage, StageDeps, StageName, load_context, refs};

pub struct StoreResultsStage;

#[async_trait]
impl Stage for StoreResultsStage {
    fn name(&self) -> StageName {
        StageName::StoreResults
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[VerificationStatus::Completed]
    }

    async fn run(&self, envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let context = load_context(deps, &envelope).await?;
        let results: VerificationResults = deps
            .store
            .retrieve_json(Some(envelope.reference(refs::FINAL_RESULTS)?))
            .await?;

        // Machine structure rides along for layout verifications; snapshots
        // may not have one on record.
        let machine_structure = match envelope.reference(refs::LAYOUT_METADATA) {
            Ok(reference) => {
                let layout: LayoutMetadata = deps.store.retrieve_json(Some(reference)).await?;
                Some(layout.machine_structure)
            }
            Err(_) => None,
        };

        let verification_row = VerificationRow {
            verification_id: context.verification_id.clone(),
            verification_at: context.verification_at,
            verification_type: context.verification_type,
            verification_status: results.verification_status,
            current_status: context.current_status,
            reference_image_url: context.reference_image_url.clone(),
            checking_image_url: context.checking_image_url.clone(),
            vending_machine_id: context.vending_machine_id.clone(),
            layout_id: context.layout_id,
            layout_prefix: context.layout_prefix.clone(),
            previous_verification_id: context.previous_verification_id.clone(),
            overall_accuracy: results.overall_accuracy,
            correct_positions: results.correct_positions,
            discrepant_positions: results.discrepant_positions,
            machine_structure,
            final_results_path: envelope.reference(refs::FINAL_RESULTS)?.key.clone(),
            initialization_path: envelope.reference(refs::INITIALIZATION)?.key.clone(),
        };
        deps.repository.put_verification(&verification_row).await?;

        let token_usage = total_token_usage(&context);
        let conversation_row = ConversationRow {
            verification_id: context.verification_id.clone(),
            conversation_at: context.verification_at,
            turn1_processed_path: envelope.reference(refs::TURN1_PROCESSED)?.key.clone(),
            turn2_processed_path: envelope.reference(refs::TURN2_PROCESSED)?.key.clone(),
            token_usage,
        };
        deps.repository.put_conversation(&conversation_row).await?;

        info!(
            verification_id = %context.verification_id,
            outcome = %results.verification_status,
            "verification and conversation rows stored"
        );
        Ok(envelope)
    }
}

fn total_token_usage(context: &vmverify_types::VerificationContext) -> Option<TokenUsage> {
    let turn1 = context.processing_metrics.turn1.as_ref()?.token_usage?;
    let turn2 = context.processing_metrics.turn2.as_ref()?.token_usage?;
    Some(TokenUsage::new(
        turn1.input_tokens + turn2.input_tokens,
        turn1.output_tokens + turn2.output_tokens,
    ))
}
