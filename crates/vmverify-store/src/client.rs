//! Object-store client abstraction
//!
//! The pipeline talks to object storage through [`ObjectStoreClient`] so
//! stages can be exercised against [`crate::memory::InMemoryObjectStore`] in
//! tests. The production implementation wraps the AWS S3 client built once at
//! startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vmverify_utils::VerifyError;

/// Metadata returned from a put or head.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMeta {
    pub size: u64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Minimal object-store surface used by the pipeline.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Write a single object. Puts are atomic at the object level.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ObjectMeta, VerifyError>;

    /// Read a single object. A missing object yields a non-retryable
    /// `NOT_FOUND`.
    async fn get(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, ObjectMeta), VerifyError>;
}

/// S3-backed client.
pub struct S3ObjectStoreClient {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStoreClient {
    /// Wrap an already-built SDK client.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build the SDK client from the ambient AWS environment.
    ///
    /// `region` and `endpoint_override` come from process configuration; the
    /// override is the only supported endpoint workaround.
    pub async fn from_environment(
        region: Option<String>,
        endpoint_override: Option<String>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(endpoint) = endpoint_override {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        Self::new(aws_sdk_s3::Client::new(&shared))
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStoreClient {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ObjectMeta, VerifyError> {
        let size = bytes.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| classify_sdk_error("put", bucket, key, &err.to_string()))?;

        Ok(ObjectMeta {
            size,
            etag: output.e_tag().map(str::to_string),
            content_type: Some(content_type.to_string()),
            last_modified: None,
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, ObjectMeta), VerifyError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let rendered = err.to_string();
                if is_not_found(&rendered) {
                    VerifyError::not_found(format!("object s3://{bucket}/{key} does not exist"))
                        .with_context("bucket", bucket)
                        .with_context("key", key)
                } else {
                    classify_sdk_error("get", bucket, key, &rendered)
                }
            })?;

        let etag = output.e_tag().map(str::to_string);
        let content_type = output.content_type().map(str::to_string);
        let last_modified = output
            .last_modified()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| {
                VerifyError::state_store(format!(
                    "failed reading body of s3://{bucket}/{key}: {err}"
                ))
                .retryable(true)
            })?
            .into_bytes()
            .to_vec();

        let meta = ObjectMeta {
            size: bytes.len() as u64,
            etag,
            content_type,
            last_modified,
        };
        Ok((bytes, meta))
    }
}

fn is_not_found(rendered: &str) -> bool {
    rendered.contains("NoSuchKey") || rendered.contains("NotFound")
}

/// Classify an SDK failure into the pipeline taxonomy.
///
/// Throttling and timeouts map to their own retryable kinds; transport-level
/// failures are retryable state-store errors; everything else is permanent.
fn classify_sdk_error(operation: &str, bucket: &str, key: &str, rendered: &str) -> VerifyError {
    let base = format!("s3 {operation} s3://{bucket}/{key} failed: {rendered}");
    if rendered.contains("SlowDown") || rendered.contains("Throttl") {
        VerifyError::throttled(base)
    } else if rendered.contains("timeout") || rendered.contains("timed out") {
        VerifyError::timeout(base)
    } else if rendered.contains("dispatch failure") || rendered.contains("connection") {
        VerifyError::state_store(base).retryable(true)
    } else {
        VerifyError::state_store(base)
    }
    .with_context("bucket", bucket)
    .with_context("key", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_of_transient_errors() {
        let err = classify_sdk_error("put", "b", "k", "SlowDown: reduce request rate");
        assert_eq!(err.code, "THROTTLED");
        assert!(err.is_retryable());

        let err = classify_sdk_error("get", "b", "k", "operation timed out");
        assert_eq!(err.code, "TIMEOUT_ERROR");
        assert!(err.is_retryable());

        let err = classify_sdk_error("put", "b", "k", "dispatch failure: connection reset");
        assert_eq!(err.code, "STATE_STORE_ERROR");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classification_of_permanent_errors() {
        let err = classify_sdk_error("put", "b", "k", "AccessDenied: forbidden");
        assert_eq!(err.code, "STATE_STORE_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("service error: NoSuchKey"));
        assert!(is_not_found("NotFound: no such object"));
        assert!(!is_not_found("AccessDenied"));
    }
}
