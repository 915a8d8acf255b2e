//! Trigger payload accepted by the Initialize stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vmverify_utils::VerifyError;

use crate::context::VerificationType;

/// External request that starts a verification.
///
/// The stage handoff format is exactly one shape; anything that does not
/// deserialize into this record is rejected at the boundary with a
/// `VALIDATION_ERROR` rather than coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggerPayload {
    pub verification_type: VerificationType,
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
    /// Opaque conversation overrides; carried through to the context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conversation_config: BTreeMap<String, serde_json::Value>,
    /// Upstream request id, reused as the correlation id when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timestamp: Option<DateTime<Utc>>,
}

impl TriggerPayload {
    /// Validate field presence rules before a context is built.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.reference_image_url.is_empty() {
            return Err(VerifyError::missing_field("referenceImageUrl"));
        }
        if self.checking_image_url.is_empty() {
            return Err(VerifyError::missing_field("checkingImageUrl"));
        }
        match self.verification_type {
            VerificationType::LayoutVsChecking => {
                if !self.layout_id.is_some_and(|id| id > 0) {
                    return Err(VerifyError::validation(
                        "layoutId must be a positive integer for LAYOUT_VS_CHECKING",
                    ));
                }
                if !self.layout_prefix.as_deref().is_some_and(|p| !p.is_empty()) {
                    return Err(VerifyError::missing_field("layoutPrefix"));
                }
            }
            VerificationType::PreviousVsCurrent => {
                if self.layout_id.is_some() || self.layout_prefix.is_some() {
                    return Err(VerifyError::validation(
                        "layoutId/layoutPrefix are forbidden for PREVIOUS_VS_CURRENT",
                    ));
                }
            }
        }
        Ok(())
    }
}
