//! vmverify — distributed two-turn verification pipeline for vending
//! machine snapshots
//!
//! A verification compares a reference image (canonical planogram or prior
//! accepted snapshot) against a checking image through a two-turn
//! conversation with a multimodal model, and produces a per-slot
//! discrepancy report. State lives in an envelope-based object-store layout;
//! results land in key-value tables.
//!
//! This crate re-exports the workspace members and provides the process
//! bootstrap that builds the shared clients once at startup.

pub mod bootstrap;

pub use vmverify_config::Config;
pub use vmverify_images as images;
pub use vmverify_model as model;
pub use vmverify_prompt as prompt;
pub use vmverify_repository as repository;
pub use vmverify_stages as stages;
pub use vmverify_stages::{Orchestrator, PipelineOutcome, StageDeps};
pub use vmverify_store as store;
pub use vmverify_types as types;
pub use vmverify_utils as utils;
pub use vmverify_utils::{CorrelationId, VerifyError};
