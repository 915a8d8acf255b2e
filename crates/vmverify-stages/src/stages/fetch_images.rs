//! FetchImages stage
//!
//! Runs three side-effect-independent units in parallel: fetch+encode the
//! reference image, fetch+encode the checking image, and the type-dependent
//! data fetch (layout metadata or the previously written historical
//! context). Failures land in a shared collector; the first failure by
//! completion order wins. Completed units' writes are harmless because
//! artifacts are keyed distinctly.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use tracing::{debug, info};
use vmverify_images::FetchedImage;
use vmverify_store::{Category, standard_filename, symbolic_reference_key};
use vmverify_types::{
    Envelope, HistoricalContext, ImageMetadata, LayoutMetadata, Reference, VerificationStatus,
    VerificationType,
};
use vmverify_utils::VerifyError;

use crate::stage::{Stage, StageDeps, StageName, load_context, persist_context, refs};

pub struct FetchImagesStage;

/// Result of the conditional third unit.
enum DataOutcome {
    Layout(Box<LayoutMetadata>),
    Historical(Box<HistoricalContext>),
    /// Bypass: historical data is provably absent, nothing to fetch.
    Skipped,
}

#[async_trait]
impl Stage for FetchImagesStage {
    fn name(&self) -> StageName {
        StageName::FetchImages
    }

    fn accepted_predecessors(&self) -> &'static [VerificationStatus] {
        &[
            VerificationStatus::Initialized,
            VerificationStatus::HistoricalContextLoaded,
            VerificationStatus::HistoricalContextNotFound,
        ]
    }

    async fn run(&self, mut envelope: Envelope, deps: &StageDeps) -> Result<Envelope, VerifyError> {
        let started = Utc::now();
        let mut context = load_context(deps, &envelope).await?;

        // Bypass pre-check: a PREVIOUS_VS_CURRENT verification without a
        // previousVerificationId is only acceptable when the historical
        // context proves there is nothing to reference.
        let bypass = if context.verification_type == VerificationType::PreviousVsCurrent {
            let reference = envelope.reference(refs::HISTORICAL_CONTEXT)?;
            let historical: HistoricalContext = deps.store.retrieve_json(Some(reference)).await?;
            let bypass = historical.bypasses_previous_id();
            let missing = context
                .previous_verification_id
                .as_deref()
                .unwrap_or_default()
                .is_empty();
            if missing && !bypass {
                return Err(VerifyError::missing_field("previousVerificationId")
                    .with_context("sourceType", historical.source_type.to_string()));
            }
            bypass
        } else {
            false
        };

        let failures: Mutex<Vec<VerifyError>> = Mutex::new(Vec::new());

        let reference_unit = async {
            match fetch_and_store(deps, &envelope, &context.reference_image_url, "reference-base64")
                .await
            {
                Ok(out) => Some(out),
                Err(err) => {
                    failures.lock().expect("lock poisoned").push(err);
                    None
                }
            }
        };
        let checking_unit = async {
            match fetch_and_store(deps, &envelope, &context.checking_image_url, "checking-base64")
                .await
            {
                Ok(out) => Some(out),
                Err(err) => {
                    failures.lock().expect("lock poisoned").push(err);
                    None
                }
            }
        };
        let data_unit = async {
            match fetch_conditional_data(deps, &envelope, &context, bypass).await {
                Ok(out) => Some(out),
                Err(err) => {
                    failures.lock().expect("lock poisoned").push(err);
                    None
                }
            }
        };

        let (reference_out, checking_out, data_out) =
            tokio::join!(reference_unit, checking_unit, data_unit);

        let mut collected = failures.into_inner().expect("lock poisoned");
        if !collected.is_empty() {
            return Err(collected.remove(0));
        }
        let (reference_image, reference_b64) = reference_out
            .ok_or_else(|| VerifyError::internal("reference image unit returned no result"))?;
        let (checking_image, checking_b64) = checking_out
            .ok_or_else(|| VerifyError::internal("checking image unit returned no result"))?;
        let data_out =
            data_out.ok_or_else(|| VerifyError::internal("data unit returned no result"))?;

        envelope.add_reference(
            symbolic_reference_key("images", "reference-base64.base64"),
            reference_b64.clone(),
        )?;
        envelope.add_reference(
            symbolic_reference_key("images", "checking-base64.base64"),
            checking_b64.clone(),
        )?;

        let now = Utc::now();
        let metadata = ImageMetadata {
            verification_id: context.verification_id.clone(),
            reference_image: reference_image.into_image_info(&reference_b64, now),
            checking_image: checking_image.into_image_info(&checking_b64, now),
            fetched_at: now,
        };
        deps.store
            .save_to_envelope(&mut envelope, Category::Images, "metadata", &metadata)
            .await?;

        context.resource_validation.reference_image_exists = true;
        context.resource_validation.checking_image_exists = true;
        context.resource_validation.validation_timestamp = Some(now);

        match data_out {
            DataOutcome::Layout(layout) => {
                deps.store
                    .save_to_envelope(&mut envelope, Category::Processing, "layout-metadata", &layout)
                    .await?;
                context.resource_validation.layout_exists = Some(true);
                envelope.summary.layout_loaded = Some(true);
            }
            DataOutcome::Historical(historical) => {
                debug!(
                    previous_verification_id =
                        historical.previous_verification_id.as_deref().unwrap_or(""),
                    "historical context confirmed from state store"
                );
            }
            DataOutcome::Skipped => {}
        }

        let now = Utc::now();
        context.turn_timestamps.images_fetched_at = Some(now);
        context.record_status(
            VerificationStatus::ImagesFetched,
            &self.name().to_string(),
            self.name().function_name(),
            crate::stage::elapsed_ms(started, now),
            now,
        )?;
        persist_context(deps, &envelope, &context).await?;

        info!(
            verification_id = %context.verification_id,
            reference_format = %metadata.reference_image.format,
            checking_format = %metadata.checking_image.format,
            "images fetched"
        );
        envelope.summary.images_fetched = Some(true);
        envelope.transition_to(VerificationStatus::ImagesFetched)?;
        Ok(envelope)
    }
}

/// Fetch one image and store its base64 payload under the standard filename.
/// Reference registration happens at the merge point; units only write.
async fn fetch_and_store(
    deps: &StageDeps,
    envelope: &Envelope,
    url: &str,
    logical_name: &str,
) -> Result<(FetchedImage, Reference), VerifyError> {
    let fetched = deps.fetcher.fetch(url).await?;
    let filename = standard_filename(Category::Images, logical_name)?;
    let reference = deps
        .store
        .store(
            envelope,
            Category::Images,
            filename,
            fetched.base64.clone().into_bytes(),
            "application/octet-stream",
        )
        .await?;
    Ok((fetched, reference))
}

/// Type-dependent third unit: layout metadata by `(layoutId, layoutPrefix)`
/// for LAYOUT_VS_CHECKING, or the historical context from the state store
/// (never the key-value table) for PREVIOUS_VS_CURRENT.
async fn fetch_conditional_data(
    deps: &StageDeps,
    envelope: &Envelope,
    context: &vmverify_types::VerificationContext,
    bypass: bool,
) -> Result<DataOutcome, VerifyError> {
    match context.verification_type {
        VerificationType::LayoutVsChecking => {
            let layout_id = context
                .layout_id
                .ok_or_else(|| VerifyError::missing_field("layoutId"))?;
            let layout_prefix = context
                .layout_prefix
                .as_deref()
                .ok_or_else(|| VerifyError::missing_field("layoutPrefix"))?;
            let layout = deps.repository.get_layout(layout_id, layout_prefix).await?;
            Ok(DataOutcome::Layout(Box::new(layout)))
        }
        VerificationType::PreviousVsCurrent => {
            if bypass {
                return Ok(DataOutcome::Skipped);
            }
            let reference = envelope.reference(refs::HISTORICAL_CONTEXT)?;
            let historical: HistoricalContext = deps.store.retrieve_json(Some(reference)).await?;
            Ok(DataOutcome::Historical(Box::new(historical)))
        }
    }
}
