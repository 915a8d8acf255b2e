//! In-memory object store for tests
//!
//! Mirrors the production client closely enough to exercise the retry and
//! not-found paths: objects live in a map keyed by `bucket/key`, puts are
//! atomic, and a configurable failure queue lets tests inject transient
//! errors ahead of a success.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use vmverify_utils::VerifyError;

use crate::client::{ObjectMeta, ObjectStoreClient};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    meta: ObjectMeta,
}

/// Map-backed object store.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_next: Mutex<Vec<VerifyError>>,
    put_count: Mutex<u64>,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next operation(s), ahead of any
    /// real work. Used to test retry behavior.
    pub fn fail_next(&self, error: VerifyError) {
        self.fail_next.lock().expect("lock poisoned").push(error);
    }

    /// Seed an object directly.
    pub fn seed(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) {
        let meta = ObjectMeta {
            size: bytes.len() as u64,
            etag: Some(format!("\"etag-{}\"", bytes.len())),
            content_type: Some(content_type.to_string()),
            last_modified: Some(Utc::now()),
        };
        self.objects
            .lock()
            .expect("lock poisoned")
            .insert(format!("{bucket}/{key}"), StoredObject { bytes, meta });
    }

    /// Whether an object exists.
    #[must_use]
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .expect("lock poisoned")
            .contains_key(&format!("{bucket}/{key}"))
    }

    /// Raw bytes of a stored object, for assertions.
    #[must_use]
    pub fn bytes_of(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("lock poisoned")
            .get(&format!("{bucket}/{key}"))
            .map(|stored| stored.bytes.clone())
    }

    /// All keys under a bucket, sorted.
    #[must_use]
    pub fn keys_in(&self, bucket: &str) -> Vec<String> {
        let prefix = format!("{bucket}/");
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .expect("lock poisoned")
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    /// Number of puts performed (including overwrites).
    #[must_use]
    pub fn put_count(&self) -> u64 {
        *self.put_count.lock().expect("lock poisoned")
    }

    fn take_injected_failure(&self) -> Option<VerifyError> {
        let mut queue = self.fail_next.lock().expect("lock poisoned");
        if queue.is_empty() { None } else { Some(queue.remove(0)) }
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ObjectMeta, VerifyError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        *self.put_count.lock().expect("lock poisoned") += 1;
        self.seed(bucket, key, bytes, content_type);
        let objects = self.objects.lock().expect("lock poisoned");
        Ok(objects[&format!("{bucket}/{key}")].meta.clone())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, ObjectMeta), VerifyError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let objects = self.objects.lock().expect("lock poisoned");
        objects
            .get(&format!("{bucket}/{key}"))
            .map(|stored| (stored.bytes.clone(), stored.meta.clone()))
            .ok_or_else(|| {
                VerifyError::not_found(format!("object s3://{bucket}/{key} does not exist"))
                    .with_context("bucket", bucket)
                    .with_context("key", key)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryObjectStore::new();
        store
            .put("b", "k", b"payload".to_vec(), "application/json")
            .await
            .unwrap();
        let (bytes, meta) = store.get("b", "k").await.unwrap();
        assert_eq!(bytes, b"payload");
        assert_eq!(meta.size, 7);
        assert!(meta.etag.is_some());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.get("b", "missing").await.unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_injected_failures_drain_in_order() {
        let store = InMemoryObjectStore::new();
        store.fail_next(VerifyError::throttled("first"));
        store.fail_next(VerifyError::timeout("second"));
        store.seed("b", "k", b"x".to_vec(), "text/plain");

        assert_eq!(store.get("b", "k").await.unwrap_err().code, "THROTTLED");
        assert_eq!(store.get("b", "k").await.unwrap_err().code, "TIMEOUT_ERROR");
        assert!(store.get("b", "k").await.is_ok());
    }
}
