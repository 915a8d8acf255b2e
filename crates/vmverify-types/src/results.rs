//! Verification results and discrepancies
//!
//! The outcome taxonomy is exactly {CORRECT, INCORRECT}; lifecycle state is
//! carried separately by [`crate::status::VerificationStatus`]. Accuracy is a
//! fraction in [0, 1]; any percentage rendering is a facade concern.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use vmverify_utils::VerifyError;

/// Final outcome of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Correct,
    Incorrect,
}

/// Issue classification for one discrepant slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyIssue {
    #[serde(rename = "Missing Product")]
    MissingProduct,
    #[serde(rename = "Incorrect Product Type")]
    IncorrectProductType,
    #[serde(rename = "Unexpected Product")]
    UnexpectedProduct,
}

impl std::fmt::Display for DiscrepancyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingProduct => f.write_str("Missing Product"),
            Self::IncorrectProductType => f.write_str("Incorrect Product Type"),
            Self::UnexpectedProduct => f.write_str("Unexpected Product"),
        }
    }
}

/// One per-slot discrepancy emitted by turn 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    /// Slot label, e.g. `A01`.
    pub position: String,
    /// What the reference expects at the slot.
    pub expected: String,
    /// What the checking image shows.
    pub found: String,
    pub issue: DiscrepancyIssue,
    /// Model confidence, 0..=100.
    pub confidence: u8,
    /// Visual evidence cited by the model.
    pub evidence: String,
    pub severity: String,
}

impl Discrepancy {
    /// Validate the confidence range and position shape.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.confidence > 100 {
            return Err(VerifyError::validation(format!(
                "discrepancy confidence {} out of range 0..=100",
                self.confidence
            )));
        }
        if self.position.is_empty() {
            return Err(VerifyError::validation("discrepancy position is empty"));
        }
        Ok(())
    }
}

/// Aggregate figures attached to the results record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub total_positions: u32,
    /// Fraction in [0, 1].
    pub accuracy_score: f64,
    pub verification_outcome: VerificationOutcome,
    /// Mean discrepancy confidence, 0..=100; 100 when no discrepancies.
    pub overall_confidence: u8,
}

/// Final results record, persisted to `processing/final-results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResults {
    pub verification_status: VerificationOutcome,
    /// Fraction in [0, 1].
    pub overall_accuracy: f64,
    pub correct_positions: u32,
    pub discrepant_positions: u32,
    pub discrepancies: Vec<Discrepancy>,
    pub verification_summary: VerificationSummary,
}

impl VerificationResults {
    /// Compose results from parsed turn-2 discrepancies.
    ///
    /// `verificationStatus` is `INCORRECT` iff any discrepancy exists;
    /// `correctPositions = totalPositions - len(discrepancies)` and
    /// `overallAccuracy = correctPositions / totalPositions`.
    pub fn from_discrepancies(
        total_positions: u32,
        discrepancies: Vec<Discrepancy>,
    ) -> Result<Self, VerifyError> {
        if total_positions == 0 {
            return Err(VerifyError::validation(
                "cannot compose results for a machine with zero positions",
            ));
        }
        for discrepancy in &discrepancies {
            discrepancy.validate()?;
        }
        if discrepancies.len() > total_positions as usize {
            return Err(VerifyError::validation(format!(
                "{} discrepancies exceed {} total positions",
                discrepancies.len(),
                total_positions
            )));
        }

        let discrepant_positions = discrepancies.len() as u32;
        let correct_positions = total_positions - discrepant_positions;
        let overall_accuracy = f64::from(correct_positions) / f64::from(total_positions);
        let verification_status = if discrepancies.is_empty() {
            VerificationOutcome::Correct
        } else {
            VerificationOutcome::Incorrect
        };
        let overall_confidence = if discrepancies.is_empty() {
            100
        } else {
            let sum: u32 = discrepancies.iter().map(|d| u32::from(d.confidence)).sum();
            (sum / discrepant_positions) as u8
        };

        Ok(Self {
            verification_status,
            overall_accuracy,
            correct_positions,
            discrepant_positions,
            discrepancies,
            verification_summary: VerificationSummary {
                total_positions,
                accuracy_score: overall_accuracy,
                verification_outcome: verification_status,
                overall_confidence,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrepancy(position: &str, issue: DiscrepancyIssue, confidence: u8) -> Discrepancy {
        Discrepancy {
            position: position.to_string(),
            expected: "Cola 330ml".to_string(),
            found: "Empty slot".to_string(),
            issue,
            confidence,
            evidence: "coils visible".to_string(),
            severity: "HIGH".to_string(),
        }
    }

    #[test]
    fn test_all_correct() {
        let results = VerificationResults::from_discrepancies(15, vec![]).unwrap();
        assert_eq!(results.verification_status, VerificationOutcome::Correct);
        assert_eq!(results.correct_positions, 15);
        assert_eq!(results.discrepant_positions, 0);
        assert!((results.overall_accuracy - 1.0).abs() < f64::EPSILON);
        assert_eq!(results.verification_summary.overall_confidence, 100);
    }

    #[test]
    fn test_two_discrepancies() {
        let results = VerificationResults::from_discrepancies(
            12,
            vec![
                discrepancy("A01", DiscrepancyIssue::MissingProduct, 95),
                discrepancy("B03", DiscrepancyIssue::IncorrectProductType, 85),
            ],
        )
        .unwrap();
        assert_eq!(results.verification_status, VerificationOutcome::Incorrect);
        assert_eq!(results.correct_positions, 10);
        assert_eq!(results.discrepant_positions, 2);
        assert!((results.overall_accuracy - 10.0 / 12.0).abs() < 1e-12);
        assert_eq!(results.verification_summary.overall_confidence, 90);
    }

    #[test]
    fn test_accuracy_is_a_fraction() {
        let results = VerificationResults::from_discrepancies(
            6,
            vec![discrepancy("A01", DiscrepancyIssue::MissingProduct, 90)],
        )
        .unwrap();
        assert!((results.overall_accuracy - 0.8333333333333334).abs() < 1e-12);
        assert!(results.overall_accuracy <= 1.0);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        assert!(VerificationResults::from_discrepancies(0, vec![]).is_err());

        let too_confident = discrepancy("A01", DiscrepancyIssue::MissingProduct, 101);
        assert!(VerificationResults::from_discrepancies(4, vec![too_confident]).is_err());

        let many = (0..5)
            .map(|i| discrepancy(&format!("A0{i}"), DiscrepancyIssue::MissingProduct, 90))
            .collect();
        assert!(VerificationResults::from_discrepancies(4, many).is_err());
    }

    #[test]
    fn test_issue_wire_spelling() {
        let json = serde_json::to_string(&DiscrepancyIssue::IncorrectProductType).unwrap();
        assert_eq!(json, "\"Incorrect Product Type\"");
        let back: DiscrepancyIssue = serde_json::from_str("\"Missing Product\"").unwrap();
        assert_eq!(back, DiscrepancyIssue::MissingProduct);
    }

    #[test]
    fn test_results_wire_shape() {
        let results = VerificationResults::from_discrepancies(
            4,
            vec![discrepancy("A01", DiscrepancyIssue::UnexpectedProduct, 80)],
        )
        .unwrap();
        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["verificationStatus"], "INCORRECT");
        assert_eq!(value["verificationSummary"]["verificationOutcome"], "INCORRECT");
        assert_eq!(value["discrepancies"][0]["issue"], "Unexpected Product");
        assert_eq!(value["correctPositions"], 3);
    }
}
