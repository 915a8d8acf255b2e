//! Stage-handoff envelope
//!
//! The envelope is the single payload exchanged between stages and returned
//! to the external orchestrator. It carries the verification id, the current
//! status, a grow-only map of symbolic names to state-store references, and a
//! tagged summary record. References are exclusive pointers: the artifact
//! behind a reference is written once and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vmverify_utils::VerifyError;

use crate::status::VerificationStatus;

/// Pointer into the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Bucket holding the object.
    pub bucket: String,
    /// Full object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// ETag returned by the store, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Known summary keys written by stages, plus one opaque extension map.
///
/// Consumers must not branch on keys outside this record; anything a stage
/// wants to surface beyond the closed set goes into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_data_found: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images_fetched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_loaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_positions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancy_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage_total: Option<u64>,
    /// Opaque extension values outside the closed key set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The stage-to-stage handoff record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Verification this envelope belongs to. Always non-empty.
    pub verification_id: String,
    /// Status after the emitting stage.
    pub status: VerificationStatus,
    /// Intake date used for date-partitioned keys.
    pub verification_date: DateTime<Utc>,
    /// Symbolic name -> state-store reference. Grows monotonically.
    #[serde(rename = "s3References", default)]
    pub references: BTreeMap<String, Reference>,
    /// Derived facts for the orchestrator and downstream consumers.
    #[serde(default)]
    pub summary: EnvelopeSummary,
}

impl Envelope {
    /// Create a fresh envelope at `INITIALIZED`.
    #[must_use]
    pub fn new(verification_id: impl Into<String>, verification_date: DateTime<Utc>) -> Self {
        Self {
            verification_id: verification_id.into(),
            status: VerificationStatus::Initialized,
            verification_date,
            references: BTreeMap::new(),
            summary: EnvelopeSummary::default(),
        }
    }

    /// Validate the envelope invariants every stage relies on.
    ///
    /// The verification id must be non-empty and every reference must point
    /// into the given state bucket. Stages call this on entry and reject
    /// anything else with a `VALIDATION_ERROR`.
    pub fn validate(&self, state_bucket: &str) -> Result<(), VerifyError> {
        if self.verification_id.is_empty() {
            return Err(VerifyError::validation(
                "envelope verificationId must not be empty",
            ));
        }
        for (name, reference) in &self.references {
            if reference.bucket != state_bucket {
                return Err(VerifyError::validation(format!(
                    "reference '{name}' points at bucket '{}', expected state bucket '{state_bucket}'",
                    reference.bucket
                ))
                .with_context("reference", name.clone()));
            }
            if reference.key.is_empty() {
                return Err(VerifyError::validation(format!(
                    "reference '{name}' has an empty key"
                )));
            }
        }
        Ok(())
    }

    /// Register a reference under a symbolic name.
    ///
    /// References grow monotonically; re-registering an existing name with a
    /// different target is a programming error and is rejected so a replayed
    /// stage cannot silently repoint an artifact.
    pub fn add_reference(
        &mut self,
        name: impl Into<String>,
        reference: Reference,
    ) -> Result<(), VerifyError> {
        let name = name.into();
        if let Some(existing) = self.references.get(&name) {
            if *existing != reference {
                return Err(VerifyError::validation(format!(
                    "reference '{name}' already registered with a different target"
                )));
            }
            return Ok(());
        }
        self.references.insert(name, reference);
        Ok(())
    }

    /// Look up a reference by symbolic name.
    pub fn reference(&self, name: &str) -> Result<&Reference, VerifyError> {
        self.references.get(name).ok_or_else(|| {
            VerifyError::not_found(format!("envelope has no reference named '{name}'"))
                .with_context("reference", name)
        })
    }

    /// Move the envelope to a new status, enforcing the status DAG.
    pub fn transition_to(&mut self, next: VerificationStatus) -> Result<(), VerifyError> {
        if !self.status.can_transition_to(next) {
            return Err(VerifyError::validation(format!(
                "illegal status transition {} -> {next}",
                self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}
