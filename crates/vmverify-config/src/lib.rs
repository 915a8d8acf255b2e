//! Process configuration for vmverify
//!
//! Configuration comes from a closed set of environment parameters resolved
//! once at startup; stage logic receives the resulting [`Config`] as an
//! explicit dependency. Unknown environment variables are ignored; missing
//! required ones fail fast with a validation error naming the variable.

use serde::{Deserialize, Serialize};
use vmverify_utils::VerifyError;

/// Default cap for retryable operations when `MAX_RETRIES` is unset.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-process cap on concurrent model calls.
pub const DEFAULT_MODEL_CONCURRENCY: usize = 4;

/// Default token budget per model call.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Resolved process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root bucket for the state store (`STATE_BUCKET`).
    pub state_bucket: String,
    /// Verifications table name (`DYNAMODB_VERIFICATION_TABLE`).
    pub verification_table: String,
    /// Conversations table name (`DYNAMODB_CONVERSATION_TABLE`).
    pub conversation_table: String,
    /// Layouts table name (`DYNAMODB_LAYOUT_TABLE`).
    pub layout_table: String,
    /// Bucket the reference image must reside in for LAYOUT_VS_CHECKING
    /// (`REFERENCE_BUCKET`).
    pub reference_bucket: String,
    /// Bucket holding checking snapshots (`CHECKING_BUCKET`).
    pub checking_bucket: String,
    /// Model identifier (`BEDROCK_MODEL`).
    pub bedrock_model: String,
    /// Upper bound for retryable operations (`MAX_RETRIES`).
    pub max_retries: u32,
    /// Log level (`LOG_LEVEL`), one of debug/info/warn/error.
    pub log_level: Option<String>,
    /// Region for AWS clients (`REGION`).
    pub region: Option<String>,
    /// Endpoint override escape hatch (`ENDPOINT_OVERRIDE`).
    pub endpoint_override: Option<String>,
    /// Per-process cap on concurrent model calls (`MODEL_CONCURRENCY`).
    pub model_concurrency: usize,
    /// Token budget per model call.
    pub max_tokens: u32,
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a `VALIDATION_ERROR` naming the first missing required
    /// variable, or a malformed numeric value.
    pub fn from_env() -> Result<Self, VerifyError> {
        let config = Self {
            state_bucket: required("STATE_BUCKET")?,
            verification_table: required("DYNAMODB_VERIFICATION_TABLE")?,
            conversation_table: required("DYNAMODB_CONVERSATION_TABLE")?,
            layout_table: required("DYNAMODB_LAYOUT_TABLE")?,
            reference_bucket: required("REFERENCE_BUCKET")?,
            checking_bucket: required("CHECKING_BUCKET")?,
            bedrock_model: required("BEDROCK_MODEL")?,
            max_retries: optional_parsed("MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES),
            log_level: optional("LOG_LEVEL"),
            region: optional("REGION"),
            endpoint_override: optional("ENDPOINT_OVERRIDE"),
            model_concurrency: optional_parsed("MODEL_CONCURRENCY")?
                .unwrap_or(DEFAULT_MODEL_CONCURRENCY),
            max_tokens: DEFAULT_MAX_TOKENS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.max_retries == 0 {
            return Err(VerifyError::validation("MAX_RETRIES must be at least 1"));
        }
        if self.model_concurrency == 0 {
            return Err(VerifyError::validation("MODEL_CONCURRENCY must be at least 1"));
        }
        if let Some(level) = self.log_level.as_deref() {
            if !matches!(level, "debug" | "info" | "warn" | "error") {
                return Err(VerifyError::validation(format!(
                    "LOG_LEVEL must be one of debug/info/warn/error, got '{level}'"
                )));
            }
        }
        Ok(())
    }

    /// Fixed configuration for tests; never reads the environment.
    #[must_use]
    #[doc(hidden)]
    pub fn for_testing() -> Self {
        Self {
            state_bucket: "state-bucket".to_string(),
            verification_table: "verifications".to_string(),
            conversation_table: "conversations".to_string(),
            layout_table: "layouts".to_string(),
            reference_bucket: "reference-bucket".to_string(),
            checking_bucket: "checking-bucket".to_string(),
            bedrock_model: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
            max_retries: 3,
            log_level: None,
            region: Some("us-east-1".to_string()),
            endpoint_override: None,
            model_concurrency: DEFAULT_MODEL_CONCURRENCY,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn required(name: &str) -> Result<String, VerifyError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            VerifyError::validation(format!("required environment variable '{name}' is not set"))
                .with_context("variable", name)
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn optional_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, VerifyError> {
    match optional(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            VerifyError::validation(format!("environment variable '{name}' has invalid value '{raw}'"))
                .with_context("variable", name)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_is_valid() {
        let config = Config::for_testing();
        config.validate().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.model_concurrency, DEFAULT_MODEL_CONCURRENCY);
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = Config::for_testing();
        config.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::for_testing();
        config.model_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::for_testing();
        config.log_level = Some("debug".to_string());
        config.validate().unwrap();

        config.log_level = Some("verbose".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.message.contains("LOG_LEVEL"));
    }
}
