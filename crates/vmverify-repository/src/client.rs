//! Key-value client abstraction and DynamoDB implementation
//!
//! The trait speaks JSON objects; the DynamoDB implementation converts to
//! and from attribute values at the boundary. Numbers survive the round trip
//! as JSON numbers, maps and lists recurse, and anything DynamoDB cannot
//! represent is rejected rather than coerced.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use vmverify_utils::VerifyError;

/// Minimal key-value surface used by the repository.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    /// Write a row. Writing the same composite key twice replaces the row
    /// with identical content, which is what stage idempotence relies on.
    async fn put_item(&self, table: &str, item: serde_json::Value) -> Result<(), VerifyError>;

    /// Read a row by its full composite key, given as `(attribute, value)`
    /// pairs.
    async fn get_item(
        &self,
        table: &str,
        key: &[(&str, serde_json::Value)],
    ) -> Result<Option<serde_json::Value>, VerifyError>;

    /// Query a secondary index for the newest row whose `key_attr` equals
    /// `key_value`, descending by the index sort key, limit 1.
    async fn query_latest(
        &self,
        table: &str,
        index: &str,
        key_attr: &str,
        key_value: &str,
    ) -> Result<Option<serde_json::Value>, VerifyError>;
}

/// DynamoDB-backed client.
pub struct DynamoKeyValueClient {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoKeyValueClient {
    #[must_use]
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }

    /// Build the SDK client from the ambient AWS environment.
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
        Self::new(aws_sdk_dynamodb::Client::new(&shared))
    }
}

#[async_trait]
impl KeyValueClient for DynamoKeyValueClient {
    async fn put_item(&self, table: &str, item: serde_json::Value) -> Result<(), VerifyError> {
        let attributes = item_to_attributes(&item)?;
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(attributes))
            .send()
            .await
            .map_err(|err| classify_sdk_error("put_item", table, &err.to_string()))?;
        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: &[(&str, serde_json::Value)],
    ) -> Result<Option<serde_json::Value>, VerifyError> {
        let mut request = self.client.get_item().table_name(table);
        for (attr, value) in key {
            request = request.key(attr.to_string(), json_to_attribute(value)?);
        }
        let output = request
            .send()
            .await
            .map_err(|err| classify_sdk_error("get_item", table, &err.to_string()))?;
        output.item.map(|item| attributes_to_item(&item)).transpose()
    }

    async fn query_latest(
        &self,
        table: &str,
        index: &str,
        key_attr: &str,
        key_value: &str,
    ) -> Result<Option<serde_json::Value>, VerifyError> {
        let output = self
            .client
            .query()
            .table_name(table)
            .index_name(index)
            .key_condition_expression("#k = :v")
            .expression_attribute_names("#k", key_attr)
            .expression_attribute_values(":v", AttributeValue::S(key_value.to_string()))
            .scan_index_forward(false)
            .limit(1)
            .send()
            .await
            .map_err(|err| classify_sdk_error("query", table, &err.to_string()))?;

        output
            .items
            .unwrap_or_default()
            .first()
            .map(attributes_to_item)
            .transpose()
    }
}

/// Classify a DynamoDB failure into the pipeline taxonomy.
fn classify_sdk_error(operation: &str, table: &str, rendered: &str) -> VerifyError {
    let base = format!("dynamodb {operation} on '{table}' failed: {rendered}");
    if rendered.contains("Throttling") || rendered.contains("ProvisionedThroughputExceeded") {
        VerifyError::throttled(base)
    } else if rendered.contains("timeout") || rendered.contains("timed out") {
        VerifyError::timeout(base)
    } else if rendered.contains("dispatch failure") || rendered.contains("connection") {
        VerifyError::key_value(base).retryable(true)
    } else {
        VerifyError::key_value(base)
    }
    .with_context("table", table)
}

fn item_to_attributes(
    item: &serde_json::Value,
) -> Result<HashMap<String, AttributeValue>, VerifyError> {
    let object = item.as_object().ok_or_else(|| {
        VerifyError::validation("key-value rows must be JSON objects at the top level")
    })?;
    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), json_to_attribute(value)?)))
        .collect()
}

fn json_to_attribute(value: &serde_json::Value) -> Result<AttributeValue, VerifyError> {
    match value {
        serde_json::Value::Null => Ok(AttributeValue::Null(true)),
        serde_json::Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        serde_json::Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
        serde_json::Value::String(s) => Ok(AttributeValue::S(s.clone())),
        serde_json::Value::Array(items) => {
            let converted: Result<Vec<_>, _> = items.iter().map(json_to_attribute).collect();
            Ok(AttributeValue::L(converted?))
        }
        serde_json::Value::Object(map) => {
            let converted: Result<HashMap<_, _>, VerifyError> = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_to_attribute(v)?)))
                .collect();
            Ok(AttributeValue::M(converted?))
        }
    }
}

fn attributes_to_item(
    attributes: &HashMap<String, AttributeValue>,
) -> Result<serde_json::Value, VerifyError> {
    let mut object = serde_json::Map::new();
    for (key, value) in attributes {
        object.insert(key.clone(), attribute_to_json(value)?);
    }
    Ok(serde_json::Value::Object(object))
}

fn attribute_to_json(attribute: &AttributeValue) -> Result<serde_json::Value, VerifyError> {
    match attribute {
        AttributeValue::Null(_) => Ok(serde_json::Value::Null),
        AttributeValue::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        AttributeValue::S(s) => Ok(serde_json::Value::String(s.clone())),
        AttributeValue::N(n) => n
            .parse::<serde_json::Number>()
            .map(serde_json::Value::Number)
            .map_err(|_| VerifyError::key_value(format!("unparseable numeric attribute '{n}'"))),
        AttributeValue::L(items) => {
            let converted: Result<Vec<_>, _> = items.iter().map(attribute_to_json).collect();
            Ok(serde_json::Value::Array(converted?))
        }
        AttributeValue::M(map) => attributes_to_item(map),
        other => Err(VerifyError::key_value(format!(
            "unsupported attribute type in row: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_attribute_round_trip() {
        let item = json!({
            "verificationId": "verif-20250530120000-abcd",
            "layoutId": 42,
            "overallAccuracy": 0.875,
            "historicalDataFound": false,
            "paths": ["a.json", "b.json"],
            "nested": {"rowCount": 3, "note": null}
        });

        let attributes = item_to_attributes(&item).unwrap();
        let back = attributes_to_item(&attributes).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_top_level_must_be_object() {
        let err = item_to_attributes(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_error_classification() {
        let err = classify_sdk_error("query", "verifications", "ThrottlingException");
        assert_eq!(err.code, "THROTTLED");
        assert!(err.is_retryable());

        let err = classify_sdk_error("put_item", "verifications", "request timed out");
        assert_eq!(err.code, "TIMEOUT_ERROR");

        let err = classify_sdk_error("put_item", "verifications", "ValidationException");
        assert_eq!(err.code, "KEY_VALUE_ERROR");
        assert!(!err.is_retryable());
    }
}
