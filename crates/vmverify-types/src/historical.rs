//! Historical verification context
//!
//! For `PREVIOUS_VS_CURRENT`, the FetchHistorical stage looks up the most
//! recent prior verification; when none exists a synthetic fallback context
//! is produced instead. The fallback is a supported mode, not an error, and
//! downstream stages consult [`HistoricalContext::bypasses_previous_id`] to
//! suppress the `previousVerificationId` requirement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::machine::MachineStructure;

/// Outcome of the historical lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextStatus {
    HistoricalContextLoaded,
    HistoricalContextNotFound,
}

/// Where the historical context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// A prior verification row was found.
    HistoricalData,
    /// No prior row exists; this is the machine's first verification.
    FreshVerification,
    /// Lookup ran but historical data is known to be absent.
    NoHistoricalData,
}

/// Result of the FetchHistorical stage, persisted to
/// `processing/historical-context.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalContext {
    pub status: ContextStatus,
    pub source_type: SourceType,
    pub historical_data_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_at: Option<DateTime<Utc>>,
    /// Outcome of the prior verification (`CORRECT`/`INCORRECT`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_since_last_verification: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_structure: Option<MachineStructure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_summary: Option<serde_json::Value>,
}

impl HistoricalContext {
    /// Context for a found prior verification.
    #[must_use]
    pub fn found(
        previous_verification_id: String,
        previous_verification_at: DateTime<Utc>,
        previous_verification_status: impl Into<String>,
        now: DateTime<Utc>,
        machine_structure: Option<MachineStructure>,
    ) -> Self {
        let hours = (now - previous_verification_at).num_seconds() as f64 / 3600.0;
        Self {
            status: ContextStatus::HistoricalContextLoaded,
            source_type: SourceType::HistoricalData,
            historical_data_found: true,
            previous_verification_id: Some(previous_verification_id),
            previous_verification_at: Some(previous_verification_at),
            previous_verification_status: Some(previous_verification_status.into()),
            hours_since_last_verification: Some(hours),
            machine_structure,
            verification_summary: None,
        }
    }

    /// Synthetic fallback context for a fresh verification.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            status: ContextStatus::HistoricalContextNotFound,
            source_type: SourceType::FreshVerification,
            historical_data_found: false,
            previous_verification_id: None,
            previous_verification_at: None,
            previous_verification_status: None,
            hours_since_last_verification: None,
            machine_structure: None,
            verification_summary: None,
        }
    }

    /// The bypass rule: whether the missing-`previousVerificationId` check
    /// must be suppressed.
    ///
    /// Holds when the source type marks historical data as absent, when the
    /// lookup flag says no data was found, or when the context status is
    /// `HISTORICAL_CONTEXT_NOT_FOUND`.
    #[must_use]
    pub fn bypasses_previous_id(&self) -> bool {
        matches!(
            self.source_type,
            SourceType::NoHistoricalData | SourceType::FreshVerification
        ) || !self.historical_data_found
            || self.status == ContextStatus::HistoricalContextNotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fresh_context_shape() {
        let ctx = HistoricalContext::fresh();
        assert_eq!(ctx.status, ContextStatus::HistoricalContextNotFound);
        assert_eq!(ctx.source_type, SourceType::FreshVerification);
        assert!(!ctx.historical_data_found);
        assert!(ctx.previous_verification_id.is_none());
        assert!(ctx.bypasses_previous_id());
    }

    #[test]
    fn test_found_context_computes_hours() {
        let prev = Utc.with_ymd_and_hms(2025, 5, 30, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let ctx = HistoricalContext::found(
            "verif-20250530090000-beef".to_string(),
            prev,
            "CORRECT",
            now,
            None,
        );
        assert_eq!(ctx.status, ContextStatus::HistoricalContextLoaded);
        assert!(ctx.historical_data_found);
        assert!((ctx.hours_since_last_verification.unwrap() - 3.0).abs() < 1e-9);
        assert!(!ctx.bypasses_previous_id());
    }

    #[test]
    fn test_bypass_on_each_condition() {
        // historicalDataFound = false alone triggers bypass.
        let mut ctx = HistoricalContext::found(
            "verif-20250530090000-beef".to_string(),
            Utc.with_ymd_and_hms(2025, 5, 30, 9, 0, 0).unwrap(),
            "CORRECT",
            Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap(),
            None,
        );
        ctx.historical_data_found = false;
        assert!(ctx.bypasses_previous_id());

        // sourceType NO_HISTORICAL_DATA alone triggers bypass.
        let mut ctx = HistoricalContext::found(
            "verif-20250530090000-beef".to_string(),
            Utc.with_ymd_and_hms(2025, 5, 30, 9, 0, 0).unwrap(),
            "CORRECT",
            Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap(),
            None,
        );
        ctx.source_type = SourceType::NoHistoricalData;
        assert!(ctx.bypasses_previous_id());

        // contextStatus HISTORICAL_CONTEXT_NOT_FOUND alone triggers bypass.
        let mut ctx = HistoricalContext::found(
            "verif-20250530090000-beef".to_string(),
            Utc.with_ymd_and_hms(2025, 5, 30, 9, 0, 0).unwrap(),
            "CORRECT",
            Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap(),
            None,
        );
        ctx.status = ContextStatus::HistoricalContextNotFound;
        assert!(ctx.bypasses_previous_id());
    }

    #[test]
    fn test_wire_spelling() {
        let json = serde_json::to_value(HistoricalContext::fresh()).unwrap();
        assert_eq!(json["status"], "HISTORICAL_CONTEXT_NOT_FOUND");
        assert_eq!(json["sourceType"], "FRESH_VERIFICATION");
        assert_eq!(json["historicalDataFound"], false);
    }
}
