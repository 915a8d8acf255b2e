//! Parsers for model output
//!
//! Turn 1 returns free-text Markdown describing the reference row by row;
//! turn 2 returns JSON with the discrepancy list, usually wrapped in a code
//! fence. Both parsers are tolerant of surrounding prose but strict about
//! the structured payload itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use vmverify_types::Discrepancy;
use vmverify_utils::VerifyError;

static ROW_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*]\s*)?(?:\*\*)?Row\s+([A-Z])(?:\*\*)?\s*[:：]\s*(.+?)\s*$")
        .expect("static pattern compiles")
});

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json)?\s*\n([\s\S]*?)\n\s*```").expect("static pattern compiles")
});

/// Parse the per-row statuses from turn-1 Markdown.
///
/// Returns `"Row A" -> "Full"` style entries; rows the model did not report
/// are simply absent.
#[must_use]
pub fn parse_reference_analysis(markdown: &str) -> BTreeMap<String, String> {
    let mut analysis = BTreeMap::new();
    for capture in ROW_STATUS.captures_iter(markdown) {
        let row = format!("Row {}", &capture[1]);
        let status = capture[2].trim_end_matches(['.', '*']).trim().to_string();
        analysis.entry(row).or_insert(status);
    }
    analysis
}

/// Structured payload of the turn-2 response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn2Payload {
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
    #[serde(default)]
    pub total_discrepancies: Option<u32>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// Extract and parse the JSON object from the turn-2 response text.
///
/// Prefers a fenced ```json block; otherwise falls back to the outermost
/// brace-delimited span. Every discrepancy is validated (confidence range,
/// non-empty position).
pub fn parse_turn2_response(text: &str) -> Result<Turn2Payload, VerifyError> {
    let candidate = JSON_FENCE
        .captures(text)
        .map(|capture| capture[1].to_string())
        .or_else(|| {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            (end > start).then(|| text[start..=end].to_string())
        })
        .ok_or_else(|| {
            VerifyError::model("turn-2 response carries no JSON object")
                .with_context("responseLength", text.len().to_string())
        })?;

    let payload: Turn2Payload = serde_json::from_str(&candidate).map_err(|err| {
        VerifyError::model(format!("turn-2 JSON failed to parse: {err}"))
    })?;

    for discrepancy in &payload.discrepancies {
        discrepancy.validate()?;
    }
    Ok(payload)
}
