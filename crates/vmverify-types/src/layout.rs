//! Layout metadata for planogram verifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::{MachineStructure, ProductPosition};

/// Canonical planogram record for a machine layout.
///
/// Loaded by FetchImages for `LAYOUT_VS_CHECKING` verifications and fed to
/// the prompt engine as the expected product mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetadata {
    /// Numeric layout identifier.
    pub layout_id: i64,
    /// Layout prefix discriminating revisions of the same id.
    pub layout_prefix: String,
    /// Machine this layout belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vending_machine_id: Option<String>,
    /// Human-readable machine location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Canonical reference image for this layout.
    pub reference_image_url: String,
    /// Source JSON object the layout was ingested from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_json_url: Option<String>,
    /// Physical machine structure.
    pub machine_structure: MachineStructure,
    /// Expected product per position.
    #[serde(default)]
    pub product_position_map: Vec<ProductPosition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serde_round_trip() {
        let at = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let layout = LayoutMetadata {
            layout_id: 42,
            layout_prefix: "planA".to_string(),
            vending_machine_id: Some("vm-17".to_string()),
            location: None,
            reference_image_url: "s3://reference-bucket/planA.png".to_string(),
            source_json_url: Some("s3://reference-bucket/planA/layout.json".to_string()),
            machine_structure: MachineStructure::conventional(3, 5),
            product_position_map: vec![ProductPosition {
                position: "A01".to_string(),
                product_id: "p-001".to_string(),
                product_name: "Sparkling Water".to_string(),
            }],
            created_at: at,
            updated_at: at,
        };

        let value = serde_json::to_value(&layout).unwrap();
        assert_eq!(value["layoutId"], 42);
        assert_eq!(value["layoutPrefix"], "planA");
        assert_eq!(value["machineStructure"]["rowCount"], 3);
        assert_eq!(value["productPositionMap"][0]["position"], "A01");
        // location is None and must be omitted entirely
        assert!(value.get("location").is_none());

        let back: LayoutMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, layout);
    }
}
