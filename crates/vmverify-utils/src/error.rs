//! Error taxonomy for the verification pipeline
//!
//! Every failure in the pipeline is represented as a [`VerifyError`] carrying
//! a stable code, a human-readable message, a retryability flag, severity,
//! and an optional correlation id plus context map. Stages and clients decide
//! retry behavior solely from the `retryable` flag; the kind determines the
//! default code and retryability but both can be overridden at construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Closed set of error kinds recognized by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input or state failed a validation pre-check.
    Validation,
    /// A required field was absent from a payload or context.
    MissingField,
    /// A referenced object or row does not exist.
    NotFound,
    /// Object-store operation failed.
    StateStore,
    /// Key-value table operation failed.
    KeyValue,
    /// Model provider invocation failed.
    Model,
    /// An operation exceeded its deadline.
    Timeout,
    /// The provider or a backing service throttled the request.
    Throttled,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Stable error code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::MissingField => "MISSING_FIELD",
            Self::NotFound => "NOT_FOUND",
            Self::StateStore => "STATE_STORE_ERROR",
            Self::KeyValue => "KEY_VALUE_ERROR",
            Self::Model => "MODEL_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Throttled => "THROTTLED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether errors of this kind are retryable by default.
    ///
    /// Transient kinds (timeout, throttling) retry; everything else is
    /// permanent unless the construction site opts in via
    /// [`VerifyError::retryable`].
    #[must_use]
    pub const fn default_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Throttled)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Severity attached to an error for reporting and triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Degraded but recoverable.
    Warning,
    /// Stage-level failure.
    #[default]
    Error,
    /// Pipeline-level failure requiring operator attention.
    Critical,
}

/// Primary error type for all pipeline operations.
///
/// The display form is `{code}: {message}` so logs and user-facing output
/// always lead with the stable code. Internal detail (stack traces,
/// credentials) must never be placed in `message` or `context`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct VerifyError {
    /// Error kind from the closed taxonomy.
    pub kind: ErrorKind,
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the failed operation may be retried.
    pub retryable: bool,
    /// Severity for reporting.
    pub severity: Severity,
    /// Correlation id of the request this error occurred in, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Structured context (stage name, keys, urls) for diagnostics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl VerifyError {
    /// Create an error of the given kind with the kind's default code,
    /// retryability, and `Error` severity.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            retryable: kind.default_retryable(),
            severity: Severity::Error,
            correlation_id: None,
            context: BTreeMap::new(),
        }
    }

    /// Validation failure (non-retryable).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// A required field was missing. Records the field name in context.
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorKind::MissingField,
            format!("required field '{field}' is missing or empty"),
        )
        .with_context("field", field)
    }

    /// A referenced object or row was not found (non-retryable).
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Object-store failure.
    #[must_use]
    pub fn state_store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateStore, message)
    }

    /// Key-value table failure.
    #[must_use]
    pub fn key_value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::KeyValue, message)
    }

    /// Model provider failure.
    #[must_use]
    pub fn model(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Model, message)
    }

    /// Deadline exceeded (retryable).
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Throttled by a backing service (retryable).
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Throttled, message)
    }

    /// Unexpected internal failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Override the retryability flag.
    #[must_use]
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Override the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Override the stable code (e.g., `HTTP_404` at a facade boundary).
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Attach the correlation id of the current request.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Whether this error represents a transient condition worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_stable() {
        assert_eq!(ErrorKind::Validation.code(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::MissingField.code(), "MISSING_FIELD");
        assert_eq!(ErrorKind::NotFound.code(), "NOT_FOUND");
        assert_eq!(ErrorKind::StateStore.code(), "STATE_STORE_ERROR");
        assert_eq!(ErrorKind::KeyValue.code(), "KEY_VALUE_ERROR");
        assert_eq!(ErrorKind::Model.code(), "MODEL_ERROR");
        assert_eq!(ErrorKind::Timeout.code(), "TIMEOUT_ERROR");
        assert_eq!(ErrorKind::Throttled.code(), "THROTTLED");
        assert_eq!(ErrorKind::Internal.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_default_retryability() {
        assert!(VerifyError::timeout("t").is_retryable());
        assert!(VerifyError::throttled("t").is_retryable());
        assert!(!VerifyError::validation("v").is_retryable());
        assert!(!VerifyError::not_found("n").is_retryable());
        assert!(!VerifyError::state_store("s").is_retryable());
        assert!(!VerifyError::key_value("k").is_retryable());
        assert!(!VerifyError::model("m").is_retryable());
        assert!(!VerifyError::internal("i").is_retryable());
    }

    #[test]
    fn test_retryable_override() {
        let err = VerifyError::state_store("transient put failure").retryable(true);
        assert!(err.is_retryable());

        let err = VerifyError::timeout("slow").retryable(false);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_display_leads_with_code() {
        let err = VerifyError::validation("bad category 'foo'");
        assert_eq!(err.to_string(), "VALIDATION_ERROR: bad category 'foo'");

        let err = VerifyError::not_found("no such object").with_code("HTTP_404");
        assert_eq!(err.to_string(), "HTTP_404: no such object");
    }

    #[test]
    fn test_missing_field_records_context() {
        let err = VerifyError::missing_field("previousVerificationId");
        assert_eq!(err.kind, ErrorKind::MissingField);
        assert_eq!(
            err.context.get("field").map(String::as_str),
            Some("previousVerificationId")
        );
        assert!(err.message.contains("previousVerificationId"));
    }

    #[test]
    fn test_serde_round_trip() {
        let err = VerifyError::throttled("provider throttling")
            .with_correlation_id("corr-0011223344556677")
            .with_context("stage", "ExecuteTurn1");

        let json = serde_json::to_string(&err).unwrap();
        let back: VerifyError = serde_json::from_str(&json).unwrap();

        assert_eq!(back.kind, ErrorKind::Throttled);
        assert_eq!(back.code, "THROTTLED");
        assert!(back.retryable);
        assert_eq!(
            back.correlation_id.as_deref(),
            Some("corr-0011223344556677")
        );
        assert_eq!(back.context.get("stage").map(String::as_str), Some("ExecuteTurn1"));
    }

    #[test]
    fn test_serialized_field_names_are_camel_case() {
        let err = VerifyError::validation("x").with_correlation_id("corr-1");
        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("correlationId").is_some());
        assert!(value.get("retryable").is_some());
        assert_eq!(value["kind"], "VALIDATION");
    }
}
