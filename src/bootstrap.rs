//! Process bootstrap
//!
//! Builds the process-wide clients (object store, key-value tables, model
//! provider, prompt registry) exactly once and wires them into the stage
//! dependencies. Construction time is logged as the cold-start metric.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use vmverify_config::Config;
use vmverify_images::ImageFetcher;
use vmverify_model::{BedrockModelClient, ModelInvoker};
use vmverify_prompt::PromptEngine;
use vmverify_repository::{DynamoKeyValueClient, VerificationRepository};
use vmverify_stages::StageDeps;
use vmverify_store::{S3ObjectStoreClient, StateStore};
use vmverify_utils::{CorrelationId, VerifyError};

/// Build the stage dependencies from resolved configuration.
pub async fn build_deps(
    config: Config,
    correlation_id: CorrelationId,
) -> Result<Arc<StageDeps>, VerifyError> {
    let started = Instant::now();

    let object_client = Arc::new(
        S3ObjectStoreClient::from_environment(
            config.region.clone(),
            config.endpoint_override.clone(),
        )
        .await,
    );
    let store = Arc::new(
        StateStore::new(object_client.clone(), config.state_bucket.clone())
            .with_max_attempts(config.max_retries),
    );

    let kv_client = Arc::new(
        DynamoKeyValueClient::from_environment(
            config.region.clone(),
            config.endpoint_override.clone(),
        )
        .await,
    );
    let repository = Arc::new(VerificationRepository::new(
        kv_client,
        config.verification_table.clone(),
        config.conversation_table.clone(),
        config.layout_table.clone(),
        config.max_retries,
    ));

    let model_client = Arc::new(
        BedrockModelClient::from_environment(
            config.bedrock_model.clone(),
            config.region.clone(),
            config.endpoint_override.clone(),
        )
        .await,
    );
    let invoker = Arc::new(ModelInvoker::new(
        model_client,
        config.model_concurrency,
        config.max_retries,
    ));

    let prompts = Arc::new(PromptEngine::new()?);
    let fetcher = Arc::new(ImageFetcher::new(object_client, config.max_retries));

    let cold_start_ms = started.elapsed().as_millis() as u64;
    info!(cold_start_ms, model = %config.bedrock_model, "clients initialized");

    Ok(Arc::new(StageDeps {
        config,
        store,
        repository,
        invoker,
        prompts,
        fetcher,
        correlation_id,
    }))
}
