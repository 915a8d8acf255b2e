//! The canonical verification record
//!
//! [`VerificationContext`] is created at Initialize and persisted under
//! `processing/initialization.json`; stages reload it, append to its history,
//! and re-persist derived artifacts. The id is immutable, the status history
//! is append-only, and `currentStatus` always equals the last appended entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use vmverify_utils::VerifyError;

use crate::status::{StatusHistoryEntry, VerificationStatus};

/// The two supported comparison modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationType {
    /// Reference is a canonical planogram with product metadata.
    LayoutVsChecking,
    /// Reference is the prior accepted snapshot of the same machine.
    PreviousVsCurrent,
}

/// Fixed two-turn conversation shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnConfig {
    pub max_turns: u8,
    pub reference_image_turn: u8,
    pub checking_image_turn: u8,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_turns: 2,
            reference_image_turn: 1,
            checking_image_turn: 2,
        }
    }
}

/// Per-phase timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTimestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialized_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn1_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn1_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn2_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn2_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Token counts for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Timing and usage metrics for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_time_ms: u64,
    /// Provider-side latency of the final successful call.
    pub bedrock_latency_ms: u64,
    /// Local processing time excluding the provider call.
    pub processing_time_ms: u64,
    pub retry_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

/// Metrics for both turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn1: Option<TurnMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn2: Option<TurnMetrics>,
}

/// Error tracking attached to the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTracking {
    pub has_errors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_error: Option<VerifyError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_history: Vec<VerifyError>,
    pub recovery_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Results of the resource pre-checks performed by FetchImages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceValidation {
    pub reference_image_exists: bool,
    pub checking_image_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_timestamp: Option<DateTime<Utc>>,
}

/// The canonical record for one verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationContext {
    /// Immutable id assigned at Initialize.
    pub verification_id: String,
    /// Intake timestamp.
    pub verification_at: DateTime<Utc>,
    pub verification_type: VerificationType,
    pub status: VerificationStatus,
    pub current_status: VerificationStatus,
    pub reference_image_url: String,
    pub checking_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vending_machine_id: Option<String>,
    /// Required for LAYOUT_VS_CHECKING, forbidden otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_id: Option<String>,
    pub turn_config: TurnConfig,
    #[serde(default)]
    pub turn_timestamps: TurnTimestamps,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    pub processing_metrics: ProcessingMetrics,
    #[serde(default)]
    pub error_tracking: ErrorTracking,
    #[serde(default)]
    pub resource_validation: ResourceValidation,
    /// Opaque passthrough values from the trigger payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VerificationContext {
    /// Validate the type-conditional field rules and turn config.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.verification_id.is_empty() {
            return Err(VerifyError::missing_field("verificationId"));
        }
        if self.turn_config.max_turns != 2 {
            return Err(VerifyError::validation(format!(
                "turnConfig.maxTurns must be 2, got {}",
                self.turn_config.max_turns
            )));
        }
        match self.verification_type {
            VerificationType::LayoutVsChecking => {
                if !self.layout_id.is_some_and(|id| id > 0) {
                    return Err(VerifyError::validation(
                        "layoutId must be a positive integer for LAYOUT_VS_CHECKING",
                    ));
                }
                if !self.layout_prefix.as_deref().is_some_and(|p| !p.is_empty()) {
                    return Err(VerifyError::validation(
                        "layoutPrefix is required for LAYOUT_VS_CHECKING",
                    ));
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

    /// Append a status transition.
    ///
    /// Appends an entry and updates both `status` and `currentStatus`. When
    /// the context is already at `status` (a replayed stage), the append is
    /// skipped so history never carries duplicates.
    pub fn record_status(
        &mut self,
        status: VerificationStatus,
        stage: &str,
        function_name: &str,
        processing_time_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<(), VerifyError> {
        if self.current_status == status
            && self.status_history.last().is_some_and(|e| e.status == status)
        {
            return Ok(());
        }
        if !self.status_history.is_empty() && !self.current_status.can_transition_to(status) {
            return Err(VerifyError::validation(format!(
                "illegal status transition {} -> {status}",
                self.current_status
            )));
        }
        self.status_history.push(StatusHistoryEntry {
            status,
            timestamp: at,
            function_name: function_name.to_string(),
            processing_time_ms,
            stage: stage.to_string(),
        });
        self.status = status;
        self.current_status = status;
        Ok(())
    }

    /// Record a surfaced error in the tracking block.
    pub fn record_error(&mut self, error: VerifyError, at: DateTime<Utc>) {
        self.error_tracking.has_errors = true;
        self.error_tracking.error_history.push(error.clone());
        self.error_tracking.current_error = Some(error);
        self.error_tracking.last_error_at = Some(at);
    }

    /// Metrics slot for the given turn number (1 or 2).
    pub fn turn_metrics_mut(&mut self, turn: u8) -> Result<&mut TurnMetrics, VerifyError> {
        let slot = match turn {
            1 => &mut self.processing_metrics.turn1,
            2 => &mut self.processing_metrics.turn2,
            other => {
                return Err(VerifyError::validation(format!(
                    "turn number must be 1 or 2, got {other}"
                )));
            }
        };
        Ok(slot.get_or_insert_with(TurnMetrics::default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(verification_type: VerificationType) -> VerificationContext {
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 10, 0, 0).unwrap();
        let (layout_id, layout_prefix) = match verification_type {
            VerificationType::LayoutVsChecking => (Some(42), Some("planA".to_string())),
            VerificationType::PreviousVsCurrent => (None, None),
        };
        VerificationContext {
            verification_id: "verif-20250530100000-abcd".to_string(),
            verification_at: at,
            verification_type,
            status: VerificationStatus::Initialized,
            current_status: VerificationStatus::Initialized,
            reference_image_url: "s3://reference-bucket/planA.png".to_string(),
            checking_image_url: "s3://checking-bucket/2025-05-30/img.png".to_string(),
            vending_machine_id: None,
            layout_id,
            layout_prefix,
            previous_verification_id: None,
            turn_config: TurnConfig::default(),
            turn_timestamps: TurnTimestamps::default(),
            status_history: vec![StatusHistoryEntry {
                status: VerificationStatus::Initialized,
                timestamp: at,
                function_name: "initialize".to_string(),
                processing_time_ms: 3,
                stage: "Initialize".to_string(),
            }],
            processing_metrics: ProcessingMetrics::default(),
            error_tracking: ErrorTracking::default(),
            resource_validation: ResourceValidation::default(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_type_conditional_fields() {
        assert!(context(VerificationType::LayoutVsChecking).validate().is_ok());
        assert!(context(VerificationType::PreviousVsCurrent).validate().is_ok());

        let mut ctx = context(VerificationType::LayoutVsChecking);
        ctx.layout_id = None;
        assert!(ctx.validate().is_err());

        let mut ctx = context(VerificationType::LayoutVsChecking);
        ctx.layout_id = Some(0);
        assert!(ctx.validate().is_err());

        let mut ctx = context(VerificationType::PreviousVsCurrent);
        ctx.layout_id = Some(42);
        assert!(ctx.validate().is_err());

        let mut ctx = context(VerificationType::PreviousVsCurrent);
        ctx.layout_prefix = Some("planA".to_string());
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_turn_config_invariant() {
        let mut ctx = context(VerificationType::LayoutVsChecking);
        ctx.turn_config.max_turns = 3;
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_record_status_appends_and_syncs() {
        let mut ctx = context(VerificationType::LayoutVsChecking);
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 10, 1, 0).unwrap();
        ctx.record_status(VerificationStatus::ImagesFetched, "FetchImages", "fetch_images", 120, at)
            .unwrap();
        assert_eq!(ctx.current_status, VerificationStatus::ImagesFetched);
        assert_eq!(ctx.status, ctx.current_status);
        assert_eq!(ctx.status_history.len(), 2);
        assert_eq!(ctx.status_history.last().unwrap().status, ctx.current_status);
    }

    #[test]
    fn test_record_status_is_idempotent_on_replay() {
        let mut ctx = context(VerificationType::LayoutVsChecking);
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 10, 1, 0).unwrap();
        ctx.record_status(VerificationStatus::ImagesFetched, "FetchImages", "fetch_images", 120, at)
            .unwrap();
        // Same transition replayed: no duplicate entry.
        ctx.record_status(VerificationStatus::ImagesFetched, "FetchImages", "fetch_images", 98, at)
            .unwrap();
        assert_eq!(ctx.status_history.len(), 2);
    }

    #[test]
    fn test_record_status_rejects_illegal_jump() {
        let mut ctx = context(VerificationType::LayoutVsChecking);
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 10, 1, 0).unwrap();
        let err = ctx
            .record_status(VerificationStatus::Turn2Started, "ExecuteTurn2", "execute_turn2", 5, at)
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert_eq!(ctx.status_history.len(), 1);
    }

    #[test]
    fn test_record_error_tracking() {
        let mut ctx = context(VerificationType::PreviousVsCurrent);
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 10, 2, 0).unwrap();
        ctx.record_error(VerifyError::state_store("put failed"), at);
        ctx.record_error(VerifyError::timeout("model deadline"), at);

        assert!(ctx.error_tracking.has_errors);
        assert_eq!(ctx.error_tracking.error_history.len(), 2);
        assert_eq!(
            ctx.error_tracking.current_error.as_ref().unwrap().code,
            "TIMEOUT_ERROR"
        );
        assert_eq!(ctx.error_tracking.last_error_at, Some(at));
    }

    #[test]
    fn test_turn_metrics_slots() {
        let mut ctx = context(VerificationType::LayoutVsChecking);
        ctx.turn_metrics_mut(1).unwrap().retry_attempts = 2;
        ctx.turn_metrics_mut(2).unwrap().token_usage = Some(TokenUsage::new(900, 400));
        assert!(ctx.turn_metrics_mut(3).is_err());

        assert_eq!(ctx.processing_metrics.turn1.as_ref().unwrap().retry_attempts, 2);
        let usage = ctx.processing_metrics.turn2.as_ref().unwrap().token_usage.unwrap();
        assert_eq!(usage.total_tokens, 1300);
    }

    #[test]
    fn test_wire_shape() {
        let ctx = context(VerificationType::LayoutVsChecking);
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["verificationType"], "LAYOUT_VS_CHECKING");
        assert_eq!(value["currentStatus"], "INITIALIZED");
        assert_eq!(value["turnConfig"]["maxTurns"], 2);
        assert_eq!(value["statusHistory"][0]["functionName"], "initialize");
        let back: VerificationContext = serde_json::from_value(value).unwrap();
        assert_eq!(back, ctx);
    }
}
