//! Machine structure and slot positions

use serde::{Deserialize, Serialize};
use vmverify_utils::VerifyError;

/// Physical structure of a vending machine face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStructure {
    /// Number of rows.
    pub row_count: u32,
    /// Number of columns in each row.
    pub columns_per_row: u32,
    /// Ordered row labels, top to bottom (e.g. `["A", "B", "C"]`).
    pub row_order: Vec<String>,
    /// Ordered column labels, left to right (e.g. `["01", "02"]`).
    pub column_order: Vec<String>,
}

impl MachineStructure {
    /// Build a conventional structure: rows `A..`, columns `01..` zero-padded.
    #[must_use]
    pub fn conventional(row_count: u32, columns_per_row: u32) -> Self {
        let row_order = (0..row_count)
            .map(|i| {
                let letter = (b'A' + (i as u8).min(25)) as char;
                letter.to_string()
            })
            .collect();
        let column_order = (1..=columns_per_row).map(|c| format!("{c:02}")).collect();
        Self {
            row_count,
            columns_per_row,
            row_order,
            column_order,
        }
    }

    /// Validate the structural consistency invariants.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.row_count == 0 {
            return Err(VerifyError::validation("machine rowCount must be > 0"));
        }
        if self.columns_per_row == 0 {
            return Err(VerifyError::validation("machine columnsPerRow must be > 0"));
        }
        if self.row_order.len() != self.row_count as usize {
            return Err(VerifyError::validation(format!(
                "rowOrder has {} labels but rowCount is {}",
                self.row_order.len(),
                self.row_count
            )));
        }
        if self.column_order.len() != self.columns_per_row as usize {
            return Err(VerifyError::validation(format!(
                "columnOrder has {} labels but columnsPerRow is {}",
                self.column_order.len(),
                self.columns_per_row
            )));
        }
        Ok(())
    }

    /// Total number of slot positions.
    #[must_use]
    pub const fn total_positions(&self) -> u32 {
        self.row_count * self.columns_per_row
    }

    /// All position labels in row-major order (`A01`, `A02`, ..).
    #[must_use]
    pub fn position_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.total_positions() as usize);
        for row in &self.row_order {
            for column in &self.column_order {
                labels.push(format!("{row}{column}"));
            }
        }
        labels
    }

    /// Whether a label like `B03` names a slot on this machine.
    #[must_use]
    pub fn contains_position(&self, position: &str) -> bool {
        self.row_order.iter().any(|row| {
            position
                .strip_prefix(row.as_str())
                .is_some_and(|column| self.column_order.iter().any(|c| c == column))
        })
    }
}

/// One product assignment in a planogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPosition {
    /// Slot label, e.g. `A01`.
    pub position: String,
    /// Product identifier.
    pub product_id: String,
    /// Display name.
    pub product_name: String,
}
