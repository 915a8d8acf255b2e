//! Template data model
//!
//! The context handed to templates: verification identity, machine facts,
//! optional product mapping, optional historical facts. Serialized camelCase
//! so template expressions read like the wire format.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vmverify_types::{
    HistoricalContext, LayoutMetadata, MachineStructure, ProductPosition, VerificationType,
};

/// Machine facts exposed to templates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineFacts {
    pub row_count: u32,
    pub column_count: u32,
    pub row_order: Vec<String>,
    pub column_order: Vec<String>,
    pub total_positions: u32,
}

impl From<&MachineStructure> for MachineFacts {
    fn from(structure: &MachineStructure) -> Self {
        Self {
            row_count: structure.row_count,
            column_count: structure.columns_per_row,
            row_order: structure.row_order.clone(),
            column_order: structure.column_order.clone(),
            total_positions: structure.total_positions(),
        }
    }
}

/// Historical facts exposed to previous-vs-current templates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalFacts {
    pub previous_verification_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_verification_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_since_last_verification: Option<f64>,
}

/// Full data model handed to a template render.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContext {
    pub verification_id: String,
    pub verification_type: VerificationType,
    pub verification_at: DateTime<Utc>,
    pub machine: MachineFacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ProductPosition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical: Option<HistoricalFacts>,
}

impl TemplateContext {
    /// Context for a planogram verification.
    #[must_use]
    pub fn for_layout(
        verification_id: impl Into<String>,
        verification_at: DateTime<Utc>,
        layout: &LayoutMetadata,
    ) -> Self {
        Self {
            verification_id: verification_id.into(),
            verification_type: VerificationType::LayoutVsChecking,
            verification_at,
            machine: MachineFacts::from(&layout.machine_structure),
            products: Some(layout.product_position_map.clone()),
            historical: None,
        }
    }

    /// Context for a previous-vs-current verification.
    ///
    /// Historical facts are included only when the lookup found a prior row;
    /// a fresh verification renders without them.
    #[must_use]
    pub fn for_previous(
        verification_id: impl Into<String>,
        verification_at: DateTime<Utc>,
        machine: &MachineStructure,
        historical: &HistoricalContext,
    ) -> Self {
        let facts = historical
            .previous_verification_id
            .as_ref()
            .filter(|_| historical.historical_data_found)
            .map(|id| HistoricalFacts {
                previous_verification_id: id.clone(),
                previous_verification_at: historical.previous_verification_at,
                previous_verification_status: historical.previous_verification_status.clone(),
                hours_since_last_verification: historical.hours_since_last_verification,
            });
        Self {
            verification_id: verification_id.into(),
            verification_type: VerificationType::PreviousVsCurrent,
            verification_at,
            machine: MachineFacts::from(machine),
            products: None,
            historical: facts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;


    #[test]
    fn test_layout_context() {
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let layout = LayoutMetadata {
            layout_id: 42,
            layout_prefix: "planA".to_string(),
            vending_machine_id: None,
            location: None,
            reference_image_url: "s3://reference-bucket/planA.png".to_string(),
            source_json_url: None,
            machine_structure: MachineStructure::conventional(3, 5),
            product_position_map: vec![ProductPosition {
                position: "A01".to_string(),
                product_id: "p1".to_string(),
                product_name: "Cola".to_string(),
            }],
            created_at: at,
            updated_at: at,
        };
        let ctx = TemplateContext::for_layout("verif-x", at, &layout);
        assert_eq!(ctx.machine.total_positions, 15);
        assert_eq!(ctx.products.as_ref().unwrap().len(), 1);
        assert!(ctx.historical.is_none());

        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["verificationType"], "LAYOUT_VS_CHECKING");
        assert_eq!(value["machine"]["rowCount"], 3);
        assert_eq!(value["machine"]["columnCount"], 5);
    }

    #[test]
    fn test_previous_context_with_history() {
        let prev = Utc.with_ymd_and_hms(2025, 5, 30, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let machine = MachineStructure::conventional(4, 6);
        let historical = HistoricalContext::found(
            "verif-prev".to_string(),
            prev,
            "CORRECT",
            now,
            None,
        );
        let ctx = TemplateContext::for_previous("verif-x", now, &machine, &historical);
        let facts = ctx.historical.unwrap();
        assert_eq!(facts.previous_verification_id, "verif-prev");
        assert_eq!(facts.previous_verification_status.as_deref(), Some("CORRECT"));
        assert!((facts.hours_since_last_verification.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_previous_context_fresh_has_no_facts() {
        let now = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let machine = MachineStructure::conventional(4, 6);
        let ctx = TemplateContext::for_previous(
            "verif-x",
            now,
            &machine,
            &HistoricalContext::fresh(),
        );
        assert!(ctx.historical.is_none());
    }
}
