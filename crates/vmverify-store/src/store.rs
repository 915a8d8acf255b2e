//! State store facade
//!
//! Wraps an [`ObjectStoreClient`] with the category/key discipline, JSON
//! codecs, retry policy, and envelope registration. All artifacts of one
//! verification live under its date partition in the single state bucket.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use vmverify_types::{Envelope, Reference};
use vmverify_utils::VerifyError;

use crate::category::{Category, standard_filename};
use crate::client::ObjectStoreClient;
use crate::keys::{build_object_key, symbolic_reference_key};
use vmverify_utils::retry::{DEFAULT_MAX_ATTEMPTS, with_backoff};

const JSON_CONTENT_TYPE: &str = "application/json";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Durable store for verification artifacts.
pub struct StateStore {
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    max_attempts: u32,
}

impl StateStore {
    /// Create a store over the given client and state bucket.
    #[must_use]
    pub fn new(client: Arc<dyn ObjectStoreClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the retry attempt cap (from `MAX_RETRIES`).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// The state bucket this store writes into.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store raw bytes under a category for the envelope's verification.
    ///
    /// The category is validated against the closed set and the key follows
    /// the date-partition discipline.
    pub async fn store(
        &self,
        envelope: &Envelope,
        category: Category,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Reference, VerifyError> {
        let key = build_object_key(
            envelope.verification_date,
            &envelope.verification_id,
            &category.to_string(),
            filename,
        )?;
        let meta = with_backoff("state_store.put", self.max_attempts, || {
            self.client
                .put(&self.bucket, &key, bytes.clone(), content_type)
        })
        .await?;

        debug!(bucket = %self.bucket, key = %key, size = meta.size, "stored artifact");
        Ok(Reference {
            bucket: self.bucket.clone(),
            key,
            size: meta.size,
            etag: meta.etag,
        })
    }

    /// Retrieve the bytes behind a reference.
    ///
    /// A `None` reference is rejected with `VALIDATION_ERROR`; a missing
    /// object is `NOT_FOUND` and never retried.
    pub async fn retrieve(&self, reference: Option<&Reference>) -> Result<Vec<u8>, VerifyError> {
        let reference = reference.ok_or_else(|| {
            VerifyError::validation("cannot retrieve through a nil reference")
        })?;
        let (bytes, _) = with_backoff("state_store.get", self.max_attempts, || {
            self.client.get(&reference.bucket, &reference.key)
        })
        .await?;
        Ok(bytes)
    }

    /// Serialize a value as JSON and store it.
    pub async fn store_json<T: Serialize>(
        &self,
        envelope: &Envelope,
        category: Category,
        filename: &str,
        value: &T,
    ) -> Result<Reference, VerifyError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|err| {
            VerifyError::internal(format!("failed to serialize artifact '{filename}': {err}"))
        })?;
        self.store(envelope, category, filename, bytes, JSON_CONTENT_TYPE)
            .await
    }

    /// Retrieve a reference and deserialize its JSON body.
    pub async fn retrieve_json<T: DeserializeOwned>(
        &self,
        reference: Option<&Reference>,
    ) -> Result<T, VerifyError> {
        let bytes = self.retrieve(reference).await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            let key = reference.map(|r| r.key.clone()).unwrap_or_default();
            VerifyError::internal(format!("artifact at '{key}' is not valid JSON: {err}"))
                .with_context("key", key)
        })
    }

    /// Store a JSON artifact under a standard filename and register its
    /// reference in the envelope under the derived symbolic name.
    pub async fn save_to_envelope<T: Serialize>(
        &self,
        envelope: &mut Envelope,
        category: Category,
        logical_name: &str,
        value: &T,
    ) -> Result<Reference, VerifyError> {
        let filename = standard_filename(category, logical_name)?;
        let reference = self.store_json(envelope, category, filename, value).await?;
        let symbolic = symbolic_reference_key(&category.to_string(), filename);
        envelope.add_reference(symbolic, reference.clone())?;
        Ok(reference)
    }

    /// Store a binary artifact (base64 payloads) under a standard filename
    /// and register it in the envelope.
    pub async fn save_binary_to_envelope(
        &self,
        envelope: &mut Envelope,
        category: Category,
        logical_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Reference, VerifyError> {
        let filename = standard_filename(category, logical_name)?;
        let reference = self
            .store(envelope, category, filename, bytes, BINARY_CONTENT_TYPE)
            .await?;
        let symbolic = symbolic_reference_key(&category.to_string(), filename);
        envelope.add_reference(symbolic, reference.clone())?;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn fixtures() -> (Arc<InMemoryObjectStore>, StateStore, Envelope) {
        let client = Arc::new(InMemoryObjectStore::new());
        let store = StateStore::new(client.clone(), "state-bucket");
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let envelope = Envelope::new("verif-20250530120000-abcd", at);
        (client, store, envelope)
    }

    #[tokio::test]
    async fn test_store_and_retrieve_round_trip() {
        let (_, store, envelope) = fixtures();
        let reference = store
            .store(
                &envelope,
                Category::Processing,
                "initialization.json",
                b"{}".to_vec(),
                "application/json",
            )
            .await
            .unwrap();
        assert_eq!(
            reference.key,
            "2025/05/30/verif-20250530120000-abcd/processing/initialization.json"
        );
        assert_eq!(reference.bucket, "state-bucket");

        let bytes = store.retrieve(Some(&reference)).await.unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_retrieve_nil_reference_is_validation_error() {
        let (_, store, _) = fixtures();
        let err = store.retrieve(None).await.unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let (_, store, envelope) = fixtures();
        let value = Sample {
            name: "machine".to_string(),
            count: 3,
        };
        let reference = store
            .store_json(&envelope, Category::Processing, "final-results.json", &value)
            .await
            .unwrap();
        let back: Sample = store.retrieve_json(Some(&reference)).await.unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn test_save_to_envelope_registers_symbolic_reference() {
        let (_, store, mut envelope) = fixtures();
        let value = Sample {
            name: "ctx".to_string(),
            count: 1,
        };
        store
            .save_to_envelope(&mut envelope, Category::Processing, "historical-context", &value)
            .await
            .unwrap();

        let reference = envelope.reference("processing_historical_context").unwrap();
        assert!(reference.key.ends_with("/processing/historical-context.json"));
        assert_eq!(reference.bucket, "state-bucket");
    }

    #[tokio::test]
    async fn test_save_to_envelope_rejects_unknown_logical_name() {
        let (_, store, mut envelope) = fixtures();
        let err = store
            .save_to_envelope(&mut envelope, Category::Processing, "bogus", &42)
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert!(envelope.references.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_retries_transient_failures() {
        let (client, store, envelope) = fixtures();
        client.fail_next(VerifyError::throttled("SlowDown"));
        client.fail_next(VerifyError::timeout("timed out"));

        let reference = store
            .store(
                &envelope,
                Category::Images,
                "metadata.json",
                b"{}".to_vec(),
                "application/json",
            )
            .await
            .unwrap();
        assert_eq!(client.put_count(), 1);
        assert!(client.contains("state-bucket", &reference.key));
    }

    #[tokio::test]
    async fn test_get_not_found_is_not_retried() {
        let (_, store, _) = fixtures();
        let reference = Reference {
            bucket: "state-bucket".to_string(),
            key: "2025/05/30/missing".to_string(),
            size: 0,
            etag: None,
        };
        let err = store.retrieve(Some(&reference)).await.unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_replayed_save_is_idempotent() {
        let (client, store, mut envelope) = fixtures();
        let value = Sample {
            name: "same".to_string(),
            count: 9,
        };
        let first = store
            .save_to_envelope(&mut envelope, Category::Processing, "initialization", &value)
            .await
            .unwrap();
        let second = store
            .save_to_envelope(&mut envelope, Category::Processing, "initialization", &value)
            .await
            .unwrap();

        // Same key, same bytes, one reference registered.
        assert_eq!(first.key, second.key);
        assert_eq!(envelope.references.len(), 1);
        assert_eq!(
            client.bytes_of("state-bucket", &first.key).unwrap(),
            serde_json::to_vec_pretty(&value).unwrap()
        );
    }
}
