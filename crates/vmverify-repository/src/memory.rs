//! In-memory key-value store for tests
//!
//! Rows are JSON objects grouped by table. `query_latest` sorts by the
//! conventional sort attribute `verificationAt` descending, mirroring the
//! secondary-index layout of the production tables.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use vmverify_utils::VerifyError;

use crate::client::KeyValueClient;

/// Map-backed key-value store.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    tables: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    fail_next: Mutex<Vec<VerifyError>>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error ahead of the next operation.
    pub fn fail_next(&self, error: VerifyError) {
        self.fail_next.lock().expect("lock poisoned").push(error);
    }

    /// All rows of a table, in insertion order.
    #[must_use]
    pub fn rows_of(&self, table: &str) -> Vec<serde_json::Value> {
        self.tables
            .lock()
            .expect("lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> Option<VerifyError> {
        let mut queue = self.fail_next.lock().expect("lock poisoned");
        if queue.is_empty() { None } else { Some(queue.remove(0)) }
    }

    fn matches_key(row: &serde_json::Value, key: &[(&str, serde_json::Value)]) -> bool {
        key.iter().all(|(attr, value)| row.get(*attr) == Some(value))
    }
}

#[async_trait]
impl KeyValueClient for InMemoryKeyValueStore {
    async fn put_item(&self, table: &str, item: serde_json::Value) -> Result<(), VerifyError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        if !item.is_object() {
            return Err(VerifyError::validation(
                "key-value rows must be JSON objects at the top level",
            ));
        }
        let mut tables = self.tables.lock().expect("lock poisoned");
        let rows = tables.entry(table.to_string()).or_default();

        // Replace a row with the same composite key so replays overwrite
        // rather than duplicate. All production tables key on
        // verificationId + a timestamp sort attribute, or layoutId+prefix.
        let key_of = |row: &serde_json::Value| {
            (
                row.get("verificationId").cloned(),
                row.get("verificationAt").cloned(),
                row.get("conversationAt").cloned(),
                row.get("layoutId").cloned(),
                row.get("layoutPrefix").cloned(),
            )
        };
        let new_key = key_of(&item);
        rows.retain(|existing| key_of(existing) != new_key);
        rows.push(item);
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: &[(&str, serde_json::Value)],
    ) -> Result<Option<serde_json::Value>, VerifyError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let tables = self.tables.lock().expect("lock poisoned");
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| Self::matches_key(row, key)))
            .cloned())
    }

    async fn query_latest(
        &self,
        table: &str,
        _index: &str,
        key_attr: &str,
        key_value: &str,
    ) -> Result<Option<serde_json::Value>, VerifyError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let tables = self.tables.lock().expect("lock poisoned");
        let mut matches: Vec<&serde_json::Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get(key_attr).and_then(|v| v.as_str()) == Some(key_value))
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by_key(|row| {
            row.get("verificationAt")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        Ok(matches.last().map(|row| (*row).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = InMemoryKeyValueStore::new();
        let row = json!({"verificationId": "v1", "verificationAt": "2025-05-30T12:00:00Z"});
        store.put_item("verifications", row.clone()).await.unwrap();

        let found = store
            .get_item(
                "verifications",
                &[
                    ("verificationId", json!("v1")),
                    ("verificationAt", json!("2025-05-30T12:00:00Z")),
                ],
            )
            .await
            .unwrap();
        assert_eq!(found, Some(row));
    }

    #[tokio::test]
    async fn test_put_same_key_replaces() {
        let store = InMemoryKeyValueStore::new();
        let first = json!({"verificationId": "v1", "verificationAt": "t", "n": 1});
        let second = json!({"verificationId": "v1", "verificationAt": "t", "n": 2});
        store.put_item("verifications", first).await.unwrap();
        store.put_item("verifications", second.clone()).await.unwrap();

        let rows = store.rows_of("verifications");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], second);
    }

    #[tokio::test]
    async fn test_query_latest_descending() {
        let store = InMemoryKeyValueStore::new();
        for (id, at) in [
            ("v1", "2025-05-30T09:00:00Z"),
            ("v2", "2025-05-30T12:00:00Z"),
            ("v3", "2025-05-30T10:00:00Z"),
        ] {
            store
                .put_item(
                    "verifications",
                    json!({
                        "verificationId": id,
                        "verificationAt": at,
                        "referenceImageUrl": "s3://checking-bucket/prev.png"
                    }),
                )
                .await
                .unwrap();
        }

        let latest = store
            .query_latest(
                "verifications",
                "ReferenceImageIndex",
                "referenceImageUrl",
                "s3://checking-bucket/prev.png",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest["verificationId"], "v2");
    }

    #[tokio::test]
    async fn test_query_no_match() {
        let store = InMemoryKeyValueStore::new();
        let result = store
            .query_latest("verifications", "ReferenceImageIndex", "referenceImageUrl", "s3://x/y")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
