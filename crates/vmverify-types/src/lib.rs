//! Domain data model for the vmverify pipeline
//!
//! This crate defines the canonical records exchanged between stages: the
//! [`VerificationContext`], the stage-handoff [`Envelope`], image and layout
//! metadata, the historical context with its fresh-verification fallback,
//! discrepancy results, and the status machine that orders the workflow.
//!
//! All records serialize as camelCase JSON; enum values use the wire spelling
//! of the external contract (`LAYOUT_VS_CHECKING`, `IMAGES_FETCHED`,
//! `Missing Product`, ...). Artifacts are written exactly once and never
//! mutated; the context itself is mutated only through append-only history.

pub mod context;
pub mod envelope;
pub mod historical;
pub mod images;
pub mod layout;
pub mod machine;
pub mod results;
pub mod status;
pub mod trigger;

pub use context::{
    ErrorTracking, ProcessingMetrics, ResourceValidation, TokenUsage, TurnConfig, TurnMetrics,
    TurnTimestamps, VerificationContext, VerificationType,
};
pub use envelope::{Envelope, EnvelopeSummary, Reference};
pub use historical::{ContextStatus, HistoricalContext, SourceType};
pub use images::{ImageFormat, ImageInfo, ImageMetadata, StorageMethod};
pub use layout::LayoutMetadata;
pub use machine::{MachineStructure, ProductPosition};
pub use results::{Discrepancy, DiscrepancyIssue, VerificationOutcome, VerificationResults, VerificationSummary};
pub use status::{StatusHistoryEntry, VerificationStatus};
pub use trigger::TriggerPayload;
