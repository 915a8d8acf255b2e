//! Workflow stages for the verification pipeline
//!
//! Eight stages drive a verification from intake to stored results:
//! Initialize, FetchHistoricalVerification, FetchImages,
//! PrepareSystemPrompt, ExecuteTurn1, ExecuteTurn2, FinalizeResults, and
//! StoreResults. The [`plan`] module is the declarative stage DAG with its
//! verification-type branch; [`Orchestrator`](plan::Orchestrator) runs it.

pub mod artifacts;
pub mod parsing;
pub mod plan;
pub mod stage;
pub mod stages;

pub use artifacts::{
    RecordedBlock, RecordedMessage, SystemPromptArtifact, Turn1Processed, Turn2Processed,
    TurnPromptArtifact,
};
pub use plan::{Orchestrator, PipelineOutcome, stage_plan};
pub use stage::{MODEL_DEADLINE, Stage, StageDeps, StageName, refs};
pub use stages::{
    ExecuteTurn1Stage, ExecuteTurn2Stage, FetchHistoricalStage, FetchImagesStage,
    FinalizeResultsStage, InitializeStage, PrepareSystemPromptStage, StoreResultsStage,
};
