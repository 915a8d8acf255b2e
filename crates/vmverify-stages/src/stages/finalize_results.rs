//! FinalizeResults stage
//!
//! Composes the final results record from the parsed turn-2 output and
//! writes `processing/final-results.json`. This is where the outcome and
//! accuracy figures become authoritative.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use vmverify_store::Category;
use vmverify_types::{Envelope, VerificationResults, VerificationStatus};
use vmverify_utils::VerifyError;

use crate::artifacts::Turn2Processed;
use crate::stage::{Stage, StageDeps, StageName, load_context, persist_context, refs};

pub struct FinalizeResultsStage;

#[async_trait]
impl Stage for FinalizeResultsStage {
    fn name(&self) -> StageName {
        StageName::FinalizeResults
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[VerificationStatus::Turn2Completed]
    }

    async fn run(&self, mut envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        let mut context = load_context(deps, &envelope).await?;
        let turn2: Turn2Processed = deps
            .store
            .retrieve_json(Some(envelope.reference(refs::TURN2_PROCESSED)?))
            .await?;
        let total_positions = envelope.summary.total_positions.ok_or_else(|| {
            VerifyError::internal("envelope summary carries no totalPositions; prompt stage did not run")
        })?;

        let results = VerificationResults::from_discrepancies(total_positions, turn2.discrepancies)?;
        deps.store
            .save_to_envelope(&mut envelope, Category::Processing, "final-results", &results)
            .await?;

        let now = Utc::now();
        context.turn_timestamps.completed_at = Some(now);
        context.record_status(
            VerificationStatus::Completed,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, now),
            now,
        )?;
        persist_context(deps, &envelope, &context).await?;

        info!(
            verification_id = %context.verification_id,
            outcome = %results.verification_status,
            accuracy = results.overall_accuracy,
            "results finalized"
        );
        envelope.summary.verification_outcome = Some(results.verification_status.to_string());
        envelope.summary.overall_accuracy = Some(results.overall_accuracy);
        envelope.transition_to(VerificationStatus::Completed)?;
        Ok(envelope)
    }
}
