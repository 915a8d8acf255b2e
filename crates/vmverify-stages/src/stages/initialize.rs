//! Initialize stage
//!
//! Validates the trigger payload, enforces the bucket-placement rules,
//! mints the verification id, writes `processing/initialization.json`, and
//! emits the first envelope.

use chrono::Utc;
use tracing::info;
use vmverify_images::parse_s3_url;
use vmverify_store::Category;
use vmverify_types::{
    Envelope, TriggerPayload, VerificationContext, VerificationStatus, VerificationType,
};
use vmverify_utils::{VerifyError, new_verification_id};

use crate::stage::{StageDeps, StageName};

/// Entry point of the workflow. Unlike the later stages it consumes the
/// trigger payload rather than an envelope.
pub struct InitializeStage;

impl InitializeStage {
    /// Run intake for a trigger payload and return the initial envelope.
    pub async fn run(
        &self,
        payload: &TriggerPayload,
        deps: &StageDeps,
    ) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        payload.validate()?;
        validate_bucket_placement(payload, deps)?;
        // The checking image must parse even though its bucket is not
        // constrained here; a malformed URL fails intake, not FetchImages.
        parse_s3_url(&payload.checking_image_url)?;

        let verification_at = payload.request_timestamp.unwrap_or(started);
        let verification_id = new_verification_id(verification_at);
        info!(
            verification_id = %verification_id,
            verification_type = %payload.verification_type,
            correlation_id = %deps.correlation_id,
            "initializing verification"
        );

        let mut context = VerificationContext {
            verification_id: verification_id.clone(),
            verification_at,
            verification_type: payload.verification_type,
            status: VerificationStatus::Initialized,
            current_status: VerificationStatus::Initialized,
            reference_image_url: payload.reference_image_url.clone(),
            checking_image_url: payload.checking_image_url.clone(),
            vending_machine_id: payload.vending_machine_id.clone(),
            layout_id: payload.layout_id,
            layout_prefix: payload.layout_prefix.clone(),
            previous_verification_id: payload.previous_verification_id.clone(),
            turn_config: Default::default(),
            turn_timestamps: Default::default(),
            status_history: Vec::new(),
            processing_metrics: Default::default(),
            error_tracking: Default::default(),
            resource_validation: Default::default(),
            extra: payload.conversation_config.clone(),
        };
        context.turn_timestamps.initialized_at = Some(started);
        let now = Utc::now();
        context.record_status(
            VerificationStatus::Initialized,
            &StageName::Initialize.to_string(),
            StageName::Initialize.function_name(),
            crate::stage::elapsed_ms(started, now),
            now,
        )?;
        context.validate()?;

        let mut envelope = Envelope::new(verification_id, verification_at);
        envelope.summary.verification_type = Some(payload.verification_type.to_string());
        deps.store
            .save_to_envelope(&mut envelope, Category::Processing, "initialization", &context)
            .await?;
        Ok(envelope)
    }
}

/// Bucket-placement pre-check on the reference image URL.
///
/// LAYOUT_VS_CHECKING references the canonical planogram in the reference
/// bucket; PREVIOUS_VS_CURRENT references the prior snapshot in the checking
/// bucket.
fn validate_bucket_placement(
    payload: &TriggerPayload,
    deps: &StageDeps,
) -> Result<(), VerifyError> {
    let reference = parse_s3_url(&payload.reference_image_url)?;
    let expected = match payload.verification_type {
        VerificationType::LayoutVsChecking => &deps.config.reference_bucket,
        VerificationType::PreviousVsCurrent => &deps.config.checking_bucket,
    };
    if reference.bucket != *expected {
        return Err(VerifyError::validation(format!(
            "reference image for {} must reside in bucket '{expected}', found '{}'",
            payload.verification_type, reference.bucket
        ))
        .with_context("referenceImageUrl", payload.reference_image_url.clone()));
    }
    Ok(())
}
