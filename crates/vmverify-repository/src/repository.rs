//! Typed repository operations
//!
//! Wraps the key-value client with row projections, retry, and existence
//! validation. Table names come from process configuration.

use std::sync::Arc;
use tracing::debug;
use vmverify_types::LayoutMetadata;
use vmverify_utils::{VerifyError, retry::with_backoff};

use crate::client::KeyValueClient;
use crate::rows::{ConversationRow, VerificationRow};

/// Secondary index used by the historical lookup.
pub const REFERENCE_IMAGE_INDEX: &str = "ReferenceImageIndex";

/// Repository over the verifications, conversations, and layouts tables.
pub struct VerificationRepository {
    client: Arc<dyn KeyValueClient>,
    verification_table: String,
    conversation_table: String,
    layout_table: String,
    max_attempts: u32,
}

impl VerificationRepository {
    #[must_use]
    pub fn new(
        client: Arc<dyn KeyValueClient>,
        verification_table: impl Into<String>,
        conversation_table: impl Into<String>,
        layout_table: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            client,
            verification_table: verification_table.into(),
            conversation_table: conversation_table.into(),
            layout_table: layout_table.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Most recent verification row whose reference image URL equals the
    /// given URL, or `None` for a fresh verification.
    pub async fn latest_by_reference_image(
        &self,
        reference_image_url: &str,
    ) -> Result<Option<VerificationRow>, VerifyError> {
        let row = with_backoff("repository.query_latest", self.max_attempts, || {
            self.client.query_latest(
                &self.verification_table,
                REFERENCE_IMAGE_INDEX,
                "referenceImageUrl",
                reference_image_url,
            )
        })
        .await?;

        row.map(|value| {
            serde_json::from_value(value).map_err(|err| {
                VerifyError::key_value(format!("verification row failed to deserialize: {err}"))
            })
        })
        .transpose()
    }

    /// Load layout metadata by `(layoutId, layoutPrefix)`.
    ///
    /// A missing row is `NOT_FOUND`; a structurally inconsistent layout is a
    /// `VALIDATION_ERROR`.
    pub async fn get_layout(
        &self,
        layout_id: i64,
        layout_prefix: &str,
    ) -> Result<LayoutMetadata, VerifyError> {
        let key: Vec<(&str, serde_json::Value)> = vec![
            ("layoutId", serde_json::json!(layout_id)),
            ("layoutPrefix", serde_json::json!(layout_prefix)),
        ];
        let row = with_backoff("repository.get_layout", self.max_attempts, || {
            self.client.get_item(&self.layout_table, &key)
        })
        .await?
        .ok_or_else(|| {
            VerifyError::not_found(format!(
                "layout ({layout_id}, '{layout_prefix}') does not exist"
            ))
            .with_context("layoutId", layout_id.to_string())
            .with_context("layoutPrefix", layout_prefix)
        })?;

        let layout: LayoutMetadata = serde_json::from_value(row).map_err(|err| {
            VerifyError::key_value(format!("layout row failed to deserialize: {err}"))
        })?;
        layout.machine_structure.validate()?;
        Ok(layout)
    }

    /// Write the verification row. Idempotent on
    /// `verificationId + verificationAt`.
    pub async fn put_verification(&self, row: &VerificationRow) -> Result<(), VerifyError> {
        let item = serde_json::to_value(row).map_err(|err| {
            VerifyError::internal(format!("verification row failed to serialize: {err}"))
        })?;
        with_backoff("repository.put_verification", self.max_attempts, || {
            self.client.put_item(&self.verification_table, item.clone())
        })
        .await?;
        debug!(verification_id = %row.verification_id, "stored verification row");
        Ok(())
    }

    /// Write the conversation row. Idempotent on
    /// `verificationId + conversationAt`.
    pub async fn put_conversation(&self, row: &ConversationRow) -> Result<(), VerifyError> {
        let item = serde_json::to_value(row).map_err(|err| {
            VerifyError::internal(format!("conversation row failed to serialize: {err}"))
        })?;
        with_backoff("repository.put_conversation", self.max_attempts, || {
            self.client.put_item(&self.conversation_table, item.clone())
        })
        .await?;
        Ok(())
    }
}
