//! Verification id generation
//!
//! Verification ids have the format `verif-{YYYYMMDDhhmmss}-{4-hex}` and are
//! generated once at Initialize; they are immutable thereafter.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^verif-\d{14}-[0-9a-f]{4}$").expect("static pattern compiles"));

/// Generate a new verification id for the given intake timestamp.
#[must_use]
pub fn new_verification_id(at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().r#gen();
    format!("verif-{}-{suffix:04x}", at.format("%Y%m%d%H%M%S"))
}

/// Check whether a string is a well-formed verification id.
#[must_use]
pub fn is_valid_verification_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generated_id_is_valid() {
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 12, 34, 56).unwrap();
        let id = new_verification_id(at);
        assert!(id.starts_with("verif-20250530123456-"));
        assert!(is_valid_verification_id(&id));
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(!is_valid_verification_id(""));
        assert!(!is_valid_verification_id("verif-20250530123456"));
        assert!(!is_valid_verification_id("verif-20250530123456-xyzw"));
        assert!(!is_valid_verification_id("verif-2025053012345-abcd"));
        assert!(!is_valid_verification_id("check-20250530123456-abcd"));
        assert!(!is_valid_verification_id("verif-20250530123456-ABCD"));
    }

    #[test]
    fn test_ids_vary_in_suffix() {
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 0, 0, 0).unwrap();
        let ids: std::collections::HashSet<String> =
            (0..32).map(|_| new_verification_id(at)).collect();
        // 32 draws from 65536 suffixes; collisions across all draws are
        // possible but a single repeated value for every draw is not.
        assert!(ids.len() > 1);
    }
}
