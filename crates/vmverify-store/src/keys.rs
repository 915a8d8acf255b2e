//! Object key discipline
//!
//! Keys are date-partitioned: `{YYYY}/{MM}/{DD}/{verificationId}/{category}/
//! {filename}`. A category path that already carries a date partition or the
//! verification id keeps it; segments are never duplicated.

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use vmverify_utils::VerifyError;

static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}/\d{2}/\d{2}").expect("static pattern compiles"));

/// Build the full object key for an artifact.
pub fn build_object_key(
    date: DateTime<Utc>,
    verification_id: &str,
    category_path: &str,
    filename: &str,
) -> Result<String, VerifyError> {
    if verification_id.is_empty() {
        return Err(VerifyError::missing_field("verificationId"));
    }
    if filename.is_empty() {
        return Err(VerifyError::missing_field("filename"));
    }

    let has_date = DATE_PREFIX.is_match(category_path);
    let has_id = category_path
        .split('/')
        .any(|segment| segment == verification_id);

    let mut key = String::new();
    if !has_date {
        key.push_str(&format!(
            "{:04}/{:02}/{:02}/",
            date.year(),
            date.month(),
            date.day()
        ));
    }
    if !has_id {
        key.push_str(verification_id);
        key.push('/');
    }
    key.push_str(category_path.trim_matches('/'));
    key.push('/');
    key.push_str(filename);
    Ok(key)
}

/// Derive the symbolic reference key registered in the envelope.
///
/// `{category}_{stem}` where the stem is the filename with a trailing
/// `.json` stripped and `/` and `-` replaced by `_`. The result never
/// carries path separators.
#[must_use]
pub fn symbolic_reference_key(category: &str, filename: &str) -> String {
    let stem = filename.strip_suffix(".json").unwrap_or(filename);
    let stem = stem.replace(['/', '-'], "_");
    format!("{category}_{stem}")
}
