//! Artifact categories and standard filenames

use strum::{Display, EnumString};
use vmverify_utils::VerifyError;

/// Closed set of artifact categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Images,
    Prompts,
    Responses,
    Processing,
}

impl Category {
    /// Parse a category, rejecting anything outside the closed set.
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        raw.parse::<Self>().map_err(|_| {
            VerifyError::validation(format!(
                "unknown artifact category '{raw}'; expected one of images, prompts, responses, processing"
            ))
            .with_context("category", raw)
        })
    }

    /// Registered standard filenames for this category.
    #[must_use]
    pub const fn standard_filenames(self) -> &'static [&'static str] {
        match self {
            Self::Images => &[
                "metadata.json",
                "reference-base64.base64",
                "checking-base64.base64",
            ],
            Self::Prompts => &[
                "system-prompt.json",
                "turn1-prompt.json",
                "turn2-prompt.json",
            ],
            Self::Responses => &["turn1-raw-response.json", "turn2-raw-response.json"],
            Self::Processing => &[
                "initialization.json",
                "historical-context.json",
                "layout-metadata.json",
                "turn1-processed-response.json",
                "turn2-processed-response.json",
                "final-results.json",
            ],
        }
    }
}

/// Resolve a logical artifact name to its standard filename.
///
/// The logical name is the filename without its extension (e.g.
/// `historical-context`, `reference-base64`). Total on the registered
/// domain; anything else is a `VALIDATION_ERROR`.
pub fn standard_filename(category: Category, logical_name: &str) -> Result<&'static str, VerifyError> {
    category
        .standard_filenames()
        .iter()
        .find(|filename| {
            filename
                .rsplit_once('.')
                .is_some_and(|(stem, _)| stem == logical_name)
        })
        .copied()
        .ok_or_else(|| {
            VerifyError::validation(format!(
                "no standard filename registered for category '{category}' and logical name '{logical_name}'"
            ))
            .with_context("category", category.to_string())
            .with_context("logicalName", logical_name)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_closed_set() {
        assert_eq!(Category::parse("images").unwrap(), Category::Images);
        assert_eq!(Category::parse("prompts").unwrap(), Category::Prompts);
        assert_eq!(Category::parse("responses").unwrap(), Category::Responses);
        assert_eq!(Category::parse("processing").unwrap(), Category::Processing);
        assert!(Category::parse("artifacts").is_err());
        assert!(Category::parse("").is_err());
        assert!(Category::parse("Images ").is_err());
    }

    #[test]
    fn test_standard_filename_known_pairs() {
        assert_eq!(
            standard_filename(Category::Images, "metadata").unwrap(),
            "metadata.json"
        );
        assert_eq!(
            standard_filename(Category::Images, "reference-base64").unwrap(),
            "reference-base64.base64"
        );
        assert_eq!(
            standard_filename(Category::Prompts, "system-prompt").unwrap(),
            "system-prompt.json"
        );
        assert_eq!(
            standard_filename(Category::Responses, "turn1-raw-response").unwrap(),
            "turn1-raw-response.json"
        );
        assert_eq!(
            standard_filename(Category::Processing, "final-results").unwrap(),
            "final-results.json"
        );
    }

    #[test]
    fn test_standard_filename_is_total_on_registry() {
        for category in [
            Category::Images,
            Category::Prompts,
            Category::Responses,
            Category::Processing,
        ] {
            for filename in category.standard_filenames() {
                let (stem, _) = filename.rsplit_once('.').unwrap();
                assert_eq!(standard_filename(category, stem).unwrap(), *filename);
            }
        }
    }

    #[test]
    fn test_standard_filename_unknown_combination() {
        let err = standard_filename(Category::Images, "final-results").unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        assert!(standard_filename(Category::Prompts, "metadata").is_err());
    }
}
