//! Artifact record shapes written by stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vmverify_types::{Discrepancy, TokenUsage};

/// `prompts/system-prompt.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPromptArtifact {
    pub prompt: String,
    pub template_type: String,
    pub template_version: String,
    pub rendered_at: DateTime<Utc>,
}

/// One recorded content block of a turn request. Image payloads are recorded
/// as pointers to their base64 artifacts, not inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RecordedBlock {
    Text { text: String },
    ImageReference { media_type: String, artifact_key: String },
}

/// One recorded message of a turn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedMessage {
    pub role: String,
    pub content: Vec<RecordedBlock>,
}

/// `prompts/turn{N}-prompt.json`: the request messages for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPromptArtifact {
    pub turn: u8,
    pub system: String,
    pub messages: Vec<RecordedMessage>,
    pub max_tokens: u32,
    pub anthropic_version: String,
    pub recorded_at: DateTime<Utc>,
}

/// `processing/turn1-processed-response.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn1Processed {
    pub content: String,
    pub token_usage: TokenUsage,
    /// Row label -> status parsed from the turn-1 Markdown
    /// (e.g. `"Row A" -> "Full"`).
    pub reference_analysis: BTreeMap<String, String>,
    pub processed_at: DateTime<Utc>,
}

/// `processing/turn2-processed-response.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn2Processed {
    pub content: String,
    pub token_usage: TokenUsage,
    pub discrepancies: Vec<Discrepancy>,
    pub total_discrepancies: u32,
    pub severity: String,
    pub processed_at: DateTime<Utc>,
}
