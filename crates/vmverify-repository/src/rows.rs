//! Row projections stored in the key-value tables
//!
//! Rows embed artifact paths, never artifact bodies; the HTTP facade reads
//! the paths and resolves them against the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmverify_types::{
    MachineStructure, TokenUsage, VerificationOutcome, VerificationStatus, VerificationType,
};

/// One row in the verifications table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRow {
    /// Partition key.
    pub verification_id: String,
    /// Sort key, RFC3339.
    pub verification_at: DateTime<Utc>,
    pub verification_type: VerificationType,
    /// Outcome of the comparison (secondary index `verificationStatus`).
    pub verification_status: VerificationOutcome,
    /// Lifecycle status at write time.
    pub current_status: VerificationStatus,
    pub reference_image_url: String,
    pub checking_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vending_machine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_id: Option<String>,
    /// Fraction in [0, 1].
    pub overall_accuracy: f64,
    pub correct_positions: u32,
    pub discrepant_positions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_structure: Option<MachineStructure>,
    /// State-store path of `processing/final-results.json`.
    pub final_results_path: String,
    /// State-store path of `processing/initialization.json`.
    pub initialization_path: String,
}

/// One row in the conversations table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    /// Partition key.
    pub verification_id: String,
    /// Sort key, RFC3339.
    pub conversation_at: DateTime<Utc>,
    pub turn1_processed_path: String,
    pub turn2_processed_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}
