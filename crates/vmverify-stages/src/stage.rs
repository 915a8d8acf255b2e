//! Stage contract and shared stage plumbing
//!
//! A stage is an independently addressable unit: it receives the envelope,
//! loads what it needs from the state store, performs its work, commits new
//! artifacts plus references, appends a status transition, and returns the
//! enlarged envelope. Stages never share mutable state; everything crosses
//! the boundary through the envelope and the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use vmverify_config::Config;
use vmverify_images::ImageFetcher;
use vmverify_model::ModelInvoker;
use vmverify_prompt::PromptEngine;
use vmverify_repository::VerificationRepository;
use vmverify_store::{Category, StateStore};
use vmverify_types::{
    Envelope, HistoricalContext, LayoutMetadata, MachineStructure, VerificationContext,
    VerificationStatus, VerificationType,
};
use vmverify_utils::{CorrelationId, VerifyError};

/// Deadline for one model turn, covering queue wait, retries, and backoff.
pub const MODEL_DEADLINE: Duration = Duration::from_secs(120);

/// Machine shape assumed when no layout or historical structure is known.
pub const DEFAULT_ROW_COUNT: u32 = 6;
/// Columns per row assumed when no layout or historical structure is known.
pub const DEFAULT_COLUMNS_PER_ROW: u32 = 10;

/// Symbolic envelope reference names used across stages.
pub mod refs {
    pub const INITIALIZATION: &str = "processing_initialization";
    pub const HISTORICAL_CONTEXT: &str = "processing_historical_context";
    pub const LAYOUT_METADATA: &str = "processing_layout_metadata";
    pub const IMAGE_METADATA: &str = "images_metadata";
    pub const REFERENCE_BASE64: &str = "images_reference_base64.base64";
    pub const CHECKING_BASE64: &str = "images_checking_base64.base64";
    pub const SYSTEM_PROMPT: &str = "prompts_system_prompt";
    pub const TURN1_PROMPT: &str = "prompts_turn1_prompt";
    pub const TURN2_PROMPT: &str = "prompts_turn2_prompt";
    pub const TURN1_RAW: &str = "responses_turn1_raw_response";
    pub const TURN2_RAW: &str = "responses_turn2_raw_response";
    pub const TURN1_PROCESSED: &str = "processing_turn1_processed_response";
    pub const TURN2_PROCESSED: &str = "processing_turn2_processed_response";
    pub const FINAL_RESULTS: &str = "processing_final_results";
}

/// Names of the workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum StageName {
    Initialize,
    FetchHistoricalVerification,
    FetchImages,
    PrepareSystemPrompt,
    ExecuteTurn1,
    ExecuteTurn2,
    FinalizeResults,
    StoreResults,
}

impl StageName {
    /// Worker function name recorded in the status history.
    #[must_use]
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::FetchHistoricalVerification => "fetch_historical_verification",
            Self::FetchImages => "fetch_images",
            Self::PrepareSystemPrompt => "prepare_system_prompt",
            Self::ExecuteTurn1 => "execute_turn1",
            Self::ExecuteTurn2 => "execute_turn2",
            Self::FinalizeResults => "finalize_results",
            Self::StoreResults => "store_results",
        }
    }
}

/// Process-wide dependencies handed to every stage.
///
/// Clients are constructed eagerly at startup and immutable afterwards;
/// stages receive them explicitly so tests can inject in-memory fakes.
pub struct StageDeps {
    pub config: Config,
    pub store: Arc<StateStore>,
    pub repository: Arc<VerificationRepository>,
    pub invoker: Arc<ModelInvoker>,
    pub prompts: Arc<PromptEngine>,
    pub fetcher: Arc<ImageFetcher>,
    pub correlation_id: CorrelationId,
}

/// The stage contract.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Envelope statuses this stage accepts on entry. Anything else is a
    /// non-retryable validation failure.
    fn accepted_predecessors(&self) -> &'static [VerificationStatus];

    /// Execute the stage and return the enlarged envelope.
    async fn run(&self, envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError>;
}

/// Load the verification context behind the envelope's initialization
/// reference.
pub async fn load_context(
    deps: &StageDeps,
    envelope: &Envelope,
) -> Result<VerificationContext, VerifyError> {
    let reference = envelope.reference(refs::INITIALIZATION)?;
    deps.store.retrieve_json(Some(reference)).await
}

/// Re-persist the context after appending to its history.
///
/// The context record is the one mutable artifact of the pipeline; its
/// mutations are restricted to append-only history, so a replayed stage
/// converges on identical bytes.
pub async fn persist_context(
    deps: &StageDeps,
    envelope: &Envelope,
    context: &VerificationContext,
) -> Result<(), VerifyError> {
    deps.store
        .store_json(envelope, Category::Processing, "initialization.json", context)
        .await
        .map(|_| ())
}

/// Resolve the machine structure a verification operates on.
///
/// LAYOUT_VS_CHECKING reads the layout metadata artifact; PREVIOUS_VS_CURRENT
/// uses the structure carried by the historical context, falling back to the
/// conventional default shape for fresh verifications.
pub async fn resolve_machine_structure(
    deps: &StageDeps,
    envelope: &Envelope,
    context: &VerificationContext,
) -> Result<(MachineStructure, Option<LayoutMetadata>, Option<HistoricalContext>), VerifyError> {
    match context.verification_type {
        VerificationType::LayoutVsChecking => {
            let reference = envelope.reference(refs::LAYOUT_METADATA)?;
            let layout: LayoutMetadata = deps.store.retrieve_json(Some(reference)).await?;
            Ok((layout.machine_structure.clone(), Some(layout), None))
        }
        VerificationType::PreviousVsCurrent => {
            let reference = envelope.reference(refs::HISTORICAL_CONTEXT)?;
            let historical: HistoricalContext = deps.store.retrieve_json(Some(reference)).await?;
            let structure = historical.machine_structure.clone().unwrap_or_else(|| {
                MachineStructure::conventional(DEFAULT_ROW_COUNT, DEFAULT_COLUMNS_PER_ROW)
            });
            Ok((structure, None, Some(historical)))
        }
    }
}

/// Build the template data model for a verification.
///
/// Combines the machine structure resolution with the type-specific context
/// shape (product mapping for layouts, historical facts for snapshots).
pub async fn build_template_context(
    deps: &StageDeps,
    envelope: &Envelope,
    context: &VerificationContext,
) -> Result<(vmverify_prompt::TemplateContext, MachineStructure), VerifyError> {
    let (structure, layout, historical) = resolve_machine_structure(deps, envelope, context).await?;
    structure.validate()?;
    let template_context = match context.verification_type {
        VerificationType::LayoutVsChecking => {
            let layout = layout.ok_or_else(|| {
                VerifyError::internal("layout metadata missing for layout verification")
            })?;
            vmverify_prompt::TemplateContext::for_layout(
                context.verification_id.clone(),
                context.verification_at,
                &layout,
            )
        }
        VerificationType::PreviousVsCurrent => {
            let historical = historical.ok_or_else(|| {
                VerifyError::internal("historical context missing for previous verification")
            })?;
            vmverify_prompt::TemplateContext::for_previous(
                context.verification_id.clone(),
                context.verification_at,
                &structure,
                &historical,
            )
        }
    };
    Ok((template_context, structure))
}

/// Timestamp helper: milliseconds between two instants, saturating.
#[must_use]
pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}
