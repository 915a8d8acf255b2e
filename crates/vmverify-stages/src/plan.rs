//! Declarative stage DAG and pipeline runner
//!
//! The plan is the external orchestrator contract expressed in code: a fixed
//! stage sequence per verification type, with the historical lookup branch
//! for PREVIOUS_VS_CURRENT. The runner validates the envelope and the
//! predecessor set before each stage, routes failures to `FAILED`, and
//! returns the enlarged envelope.

use chrono::Utc;
use std::sync::Arc;
use tracing::{Instrument, error};
use vmverify_types::{Envelope, TriggerPayload, VerificationStatus, VerificationType};
use vmverify_utils::{VerifyError, logging::stage_span};

use crate::stage::{Stage, StageDeps, StageName, load_context, persist_context};
use crate::stages::{
    ExecuteTurn1Stage, ExecuteTurn2Stage, FetchHistoricalStage, FetchImagesStage,
    FinalizeResultsStage, InitializeStage, PrepareSystemPromptStage, StoreResultsStage,
};

/// Stage sequence for a verification type, excluding Initialize (which
/// consumes the trigger payload rather than an envelope).
#[must_use]
pub fn stage_plan(verification_type: VerificationType) -> &'static [StageName] {
    match verification_type {
        VerificationType::LayoutVsChecking => &[
            StageName::FetchImages,
            StageName::PrepareSystemPrompt,
            StageName::ExecuteTurn1,
            StageName::ExecuteTurn2,
            StageName::FinalizeResults,
            StageName::StoreResults,
        ],
        VerificationType::PreviousVsCurrent => &[
            StageName::FetchHistoricalVerification,
            StageName::FetchImages,
            StageName::PrepareSystemPrompt,
            StageName::ExecuteTurn1,
            StageName::ExecuteTurn2,
            StageName::FinalizeResults,
            StageName::StoreResults,
        ],
    }
}

/// Final state of a pipeline run. On failure the envelope is at `FAILED`
/// and the error carries the stable code and context.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub envelope: Envelope,
    pub error: Option<VerifyError>,
}

impl PipelineOutcome {
    /// Whether the run reached `COMPLETED`.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.error.is_none() && self.envelope.status == VerificationStatus::Completed
    }
}

/// Drives a verification through the stage plan.
pub struct Orchestrator {
    deps: Arc<StageDeps>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(deps: Arc<StageDeps>) -> Self {
        Self { deps }
    }

    #[must_use]
    pub fn deps(&self) -> &StageDeps {
        &self.deps
    }

    /// Run a verification from intake to final envelope.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when Initialize itself rejects the payload (there
    /// is no envelope yet). Failures in later stages are reported through
    /// [`PipelineOutcome::error`] with the envelope at `FAILED`.
    pub async fn run(&self, payload: &TriggerPayload) -> Result<PipelineOutcome, VerifyError> {
        let mut envelope = InitializeStage.run(payload, &self.deps).await.map_err(|err| {
            err.with_correlation_id(self.deps.correlation_id.as_str())
        })?;

        for name in stage_plan(payload.verification_type) {
            match self.execute_stage(*name, envelope.clone()).await {
                Ok(next) => envelope = next,
                Err(err) => {
                    let err = err
                        .with_correlation_id(self.deps.correlation_id.as_str())
                        .with_context("stage", name.to_string());
                    error!(
                        stage = %name,
                        verification_id = %envelope.verification_id,
                        error = %err,
                        "stage failed; marking verification FAILED"
                    );
                    self.mark_failed(&mut envelope, *name, &err).await;
                    return Ok(PipelineOutcome {
                        envelope,
                        error: Some(err),
                    });
                }
            }
        }

        Ok(PipelineOutcome {
            envelope,
            error: None,
        })
    }

    /// Execute one stage with entry validation.
    pub async fn execute_stage(
        &self,
        name: StageName,
        envelope: Envelope,
    ) -> Result<Envelope, VerifyError> {
        envelope.validate(&self.deps.config.state_bucket)?;
        let stage = stage_for(name)?;
        if !stage.accepted_predecessors().contains(&envelope.status) {
            return Err(VerifyError::validation(format!(
                "stage {name} cannot run from status {}",
                envelope.status
            ))
            .with_context("status", envelope.status.to_string()));
        }

        let span = stage_span(&envelope.verification_id, &name.to_string(), &self.deps.correlation_id);
        stage.run(envelope, &self.deps).instrument(span).await
    }

    /// Route a stage failure into the error tracking and the absorbing
    /// `FAILED` status. Best-effort: a second failure while recording must
    /// not mask the original error.
    async fn mark_failed(&self, envelope: &mut Envelope, stage: StageName, error: &VerifyError) {
        if let Ok(mut context) = load_context(&self.deps, envelope).await {
            let now = Utc::now();
            context.record_error(error.clone(), now);
            if context
                .record_status(
                    VerificationStatus::Failed,
                    &stage.to_string(),
                    stage.function_name(),
                    0,
                    now,
                )
                .is_ok()
            {
                let _ = persist_context(&self.deps, envelope, &context).await;
            }
        }
        if !envelope.status.is_terminal() {
            let _ = envelope.transition_to(VerificationStatus::Failed);
        }
    }
}

fn stage_for(name: StageName) -> Result<Box<dyn Stage>, VerifyError> {
    match name {
        StageName::FetchHistoricalVerification => Ok(Box::new(FetchHistoricalStage)),
        StageName::FetchImages => Ok(Box::new(FetchImagesStage)),
        StageName::PrepareSystemPrompt => Ok(Box::new(PrepareSystemPromptStage)),
        StageName::ExecuteTurn1 => Ok(Box::new(ExecuteTurn1Stage)),
        StageName::ExecuteTurn2 => Ok(Box::new(ExecuteTurn2Stage)),
        StageName::FinalizeResults => Ok(Box::new(FinalizeResultsStage)),
        StageName::StoreResults => Ok(Box::new(StoreResultsStage)),
        // Initialize consumes a trigger payload, not an envelope.
        StageName::Initialize => Err(VerifyError::validation(
            "Initialize is payload-driven and cannot run from an envelope",
        )),
    }
}
