//! Structured logging and correlation ids
//!
//! Every external trigger is assigned a correlation id which is threaded
//! through all stages and attached to every structured event and error.
//! Field names are stable: `verification_id`, `stage`, `correlation_id`,
//! `duration_ms`.

use rand::Rng;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Per-request correlation id, format `corr-{16-hex}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh correlation id.
    #[must_use]
    pub fn generate() -> Self {
        let bits: u64 = rand::thread_rng().r#gen();
        Self(format!("corr-{bits:016x}"))
    }

    /// Wrap an id received from an upstream trigger.
    #[must_use]
    pub fn from_request(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Initialize the tracing subscriber.
///
/// The filter honors `LOG_LEVEL` (debug/info/warn/error) when set, then
/// `RUST_LOG`, and defaults to `info`. Safe to call once per process; a
/// second call returns an error from the underlying registry.
pub fn init_tracing(log_level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let directive = log_level
        .map(str::to_ascii_lowercase)
        .filter(|level| matches!(level.as_str(), "debug" | "info" | "warn" | "error"));

    let env_filter = match directive {
        Some(level) => EnvFilter::try_new(format!("vmverify={level},{level}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Create a span for one stage execution with the stable field set.
#[must_use]
pub fn stage_span(verification_id: &str, stage: &str, correlation_id: &CorrelationId) -> tracing::Span {
    span!(
        Level::INFO,
        "stage_execution",
        verification_id = %verification_id,
        stage = %stage,
        correlation_id = %correlation_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_format() {
        let id = CorrelationId::generate();
        assert!(id.as_str().starts_with("corr-"));
        assert_eq!(id.as_str().len(), "corr-".len() + 16);
        assert!(
            id.as_str()["corr-".len()..]
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_correlation_id_from_request_preserved() {
        let id = CorrelationId::from_request("req-supplied-id");
        assert_eq!(id.as_str(), "req-supplied-id");
        assert_eq!(id.to_string(), "req-supplied-id");
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = CorrelationId::from_request("corr-aabbccdd00112233");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"corr-aabbccdd00112233\"");
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_stage_span_builds() {
        let corr = CorrelationId::generate();
        let _span = stage_span("verif-20250530120000-abcd", "Initialize", &corr);
    }
}
