//! FetchHistoricalVerification stage
//!
//! PREVIOUS_VS_CURRENT only. Looks up the most recent verification row whose
//! reference image URL equals the current checking image; absence is the
//! supported fresh-verification mode, not an error.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use vmverify_store::Category;
use vmverify_types::{Envelope, HistoricalContext, VerificationStatus};
use vmverify_utils::VerifyError;

use crate::stage::{Stage, StageDeps, StageName, load_context, persist_context};

pub struct FetchHistoricalStage;

#[async_trait]
impl Stage for FetchHistoricalStage {
    fn name(&self) -> StageName {
        StageName::FetchHistoricalVerification
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[VerificationStatus::Initialized]
    }

    async fn run(&self, mut envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        let mut context = load_context(deps, &envelope).await?;

        let prior = deps
            .repository
            .latest_by_reference_image(&context.checking_image_url)
            .await?;

        let (historical, status) = match prior {
            Some(row) => {
                info!(
                    verification_id = %context.verification_id,
                    previous_verification_id = %row.verification_id,
                    "historical verification found"
                );
                let historical = HistoricalContext::found(
                    row.verification_id.clone(),
                    row.verification_at,
                    row.verification_status.to_string(),
                    started,
                    row.machine_structure,
                );
                context.previous_verification_id = Some(row.verification_id);
                (historical, VerificationStatus::HistoricalContextLoaded)
            }
            None => {
                info!(
                    verification_id = %context.verification_id,
                    "no historical verification; continuing as fresh verification"
                );
                (
                    HistoricalContext::fresh(),
                    VerificationStatus::HistoricalContextNotFound,
                )
            }
        };

        deps.store
            .save_to_envelope(&mut envelope, Category::Processing, "historical-context", &historical)
            .await?;

        let now = Utc::now();
        context.record_status(
            status,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, now),
            now,
        )?;
        persist_context(deps, &envelope, &context).await?;

        envelope.summary.historical_data_found = Some(historical.historical_data_found);
        envelope.transition_to(status)?;
        Ok(envelope)
    }
}
