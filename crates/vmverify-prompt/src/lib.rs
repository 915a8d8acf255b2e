//! Versioned prompt templates for the two-turn verification conversation
//!
//! Templates are keyed by `(templateType, version)` where the template type
//! is the verification type lower-cased with `_` replaced by `-`. Compiled
//! templates live in a handlebars registry built once at startup; rendering
//! falls back through registered versions in descending order and finally to
//! the `default` template type.

pub mod context;
pub mod helpers;

pub use context::{HistoricalFacts, MachineFacts, TemplateContext};

use handlebars::Handlebars;
use std::collections::BTreeMap;
use vmverify_types::VerificationType;
use vmverify_utils::VerifyError;

/// Template type for the `default` fallback.
pub const DEFAULT_TEMPLATE_TYPE: &str = "default";

/// Version registered for the embedded templates.
pub const EMBEDDED_VERSION: &str = "v1";

/// Which prompt of the conversation to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    System,
    Turn1,
    Turn2,
}

impl PromptKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Turn1 => "turn1",
            Self::Turn2 => "turn2",
        }
    }
}

/// Derive the template type for a verification type
/// (`LAYOUT_VS_CHECKING` -> `layout-vs-checking`).
#[must_use]
pub fn template_type_for(verification_type: VerificationType) -> String {
    verification_type.to_string().to_lowercase().replace('_', "-")
}

/// Embedded template sources compiled at startup.
const EMBEDDED_TEMPLATES: &[(&str, &str, &str, &str)] = &[
    (
        "layout-vs-checking",
        EMBEDDED_VERSION,
        "system",
        include_str!("../templates/layout-vs-checking/v1/system.hbs"),
    ),
    (
        "layout-vs-checking",
        EMBEDDED_VERSION,
        "turn1",
        include_str!("../templates/layout-vs-checking/v1/turn1.hbs"),
    ),
    (
        "layout-vs-checking",
        EMBEDDED_VERSION,
        "turn2",
        include_str!("../templates/layout-vs-checking/v1/turn2.hbs"),
    ),
    (
        "previous-vs-current",
        EMBEDDED_VERSION,
        "system",
        include_str!("../templates/previous-vs-current/v1/system.hbs"),
    ),
    (
        "previous-vs-current",
        EMBEDDED_VERSION,
        "turn1",
        include_str!("../templates/previous-vs-current/v1/turn1.hbs"),
    ),
    (
        "previous-vs-current",
        EMBEDDED_VERSION,
        "turn2",
        include_str!("../templates/previous-vs-current/v1/turn2.hbs"),
    ),
    (
        DEFAULT_TEMPLATE_TYPE,
        EMBEDDED_VERSION,
        "system",
        include_str!("../templates/default/v1/system.hbs"),
    ),
    (
        DEFAULT_TEMPLATE_TYPE,
        EMBEDDED_VERSION,
        "turn1",
        include_str!("../templates/default/v1/turn1.hbs"),
    ),
    (
        DEFAULT_TEMPLATE_TYPE,
        EMBEDDED_VERSION,
        "turn2",
        include_str!("../templates/default/v1/turn2.hbs"),
    ),
];

/// Prompt engine holding the compiled template registry.
pub struct PromptEngine {
    registry: Handlebars<'static>,
    /// Template type -> registered versions, descending.
    versions: BTreeMap<String, Vec<String>>,
}

impl PromptEngine {
    /// Build the engine with the embedded templates and the closed helper
    /// set. Constructed once per process.
    pub fn new() -> Result<Self, VerifyError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        helpers::register_helpers(&mut registry);

        let mut engine = Self {
            registry,
            versions: BTreeMap::new(),
        };
        for (template_type, version, kind, source) in EMBEDDED_TEMPLATES {
            engine.register(template_type, version, kind, source)?;
        }
        Ok(engine)
    }

    /// Register (or replace) one template. Versions sort descending per type.
    pub fn register(
        &mut self,
        template_type: &str,
        version: &str,
        kind: &str,
        source: &str,
    ) -> Result<(), VerifyError> {
        let name = template_name(template_type, version, kind);
        self.registry
            .register_template_string(&name, source)
            .map_err(|err| {
                VerifyError::validation(format!("template '{name}' failed to compile: {err}"))
            })?;
        let versions = self.versions.entry(template_type.to_string()).or_default();
        if !versions.iter().any(|v| v == version) {
            versions.push(version.to_string());
            versions.sort_by(|a, b| b.cmp(a));
        }
        Ok(())
    }

    /// Render a prompt for a verification type.
    ///
    /// Resolution order: the requested version of the type's template set,
    /// then registered versions of that type in descending order, then the
    /// `default` template type.
    pub fn render(
        &self,
        kind: PromptKind,
        verification_type: VerificationType,
        version: Option<&str>,
        context: &TemplateContext,
    ) -> Result<String, VerifyError> {
        let template_type = template_type_for(verification_type);
        let name = self
            .resolve(&template_type, version, kind)
            .ok_or_else(|| {
                VerifyError::validation(format!(
                    "no template registered for type '{template_type}' kind '{}'",
                    kind.as_str()
                ))
            })?;
        self.registry.render(&name, context).map_err(|err| {
            VerifyError::internal(format!("template '{name}' failed to render: {err}"))
                .with_context("template", name)
        })
    }

    fn resolve(&self, template_type: &str, version: Option<&str>, kind: PromptKind) -> Option<String> {
        if let Some(version) = version {
            let name = template_name(template_type, version, kind.as_str());
            if self.registry.get_templates().contains_key(&name) {
                return Some(name);
            }
        }
        if let Some(versions) = self.versions.get(template_type) {
            for registered in versions {
                let name = template_name(template_type, registered, kind.as_str());
                if self.registry.get_templates().contains_key(&name) {
                    return Some(name);
                }
            }
        }
        if template_type != DEFAULT_TEMPLATE_TYPE {
            return self.resolve(DEFAULT_TEMPLATE_TYPE, None, kind);
        }
        None
    }
}

fn template_name(template_type: &str, version: &str, kind: &str) -> String {
    format!("{template_type}@{version}:{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vmverify_types::{HistoricalContext, MachineStructure};

    fn layout_context() -> TemplateContext {
        let at = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let layout = vmverify_types::LayoutMetadata {
            layout_id: 42,
            layout_prefix: "planA".to_string(),
            vending_machine_id: None,
            location: None,
            reference_image_url: "s3://reference-bucket/planA.png".to_string(),
            source_json_url: None,
            machine_structure: MachineStructure::conventional(6, 10),
            product_position_map: vec![vmverify_types::ProductPosition {
                position: "A01".to_string(),
                product_id: "p1".to_string(),
                product_name: "Cola 330ml".to_string(),
            }],
            created_at: at,
            updated_at: at,
        };
        TemplateContext::for_layout("verif-20250530120000-abcd", at, &layout)
    }

    #[test]
    fn test_template_type_derivation() {
        assert_eq!(
            template_type_for(VerificationType::LayoutVsChecking),
            "layout-vs-checking"
        );
        assert_eq!(
            template_type_for(VerificationType::PreviousVsCurrent),
            "previous-vs-current"
        );
    }

    #[test]
    fn test_render_layout_system_prompt() {
        let engine = PromptEngine::new().unwrap();
        let rendered = engine
            .render(PromptKind::System, VerificationType::LayoutVsChecking, None, &layout_context())
            .unwrap();

        assert!(rendered.contains("6 rows"));
        assert!(rendered.contains("60 positions"));
        assert!(rendered.contains("A through F"));
        assert!(rendered.contains("01 through 10"));
        assert!(rendered.contains("Cola 330ml (p1)"));
    }

    #[test]
    fn test_render_previous_system_prompt_with_history() {
        let prev = Utc.with_ymd_and_hms(2025, 5, 30, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let machine = MachineStructure::conventional(4, 8);
        let historical = HistoricalContext::found(
            "verif-20250530090000-beef".to_string(),
            prev,
            "CORRECT",
            now,
            None,
        );
        let ctx = TemplateContext::for_previous("verif-x", now, &machine, &historical);

        let engine = PromptEngine::new().unwrap();
        let rendered = engine
            .render(PromptKind::System, VerificationType::PreviousVsCurrent, None, &ctx)
            .unwrap();
        assert!(rendered.contains("verif-20250530090000-beef"));
        assert!(rendered.contains("hours ago"));
        assert!(rendered.contains("CORRECT"));
    }

    #[test]
    fn test_render_previous_system_prompt_fresh() {
        let now = Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap();
        let machine = MachineStructure::conventional(4, 8);
        let ctx = TemplateContext::for_previous("verif-x", now, &machine, &HistoricalContext::fresh());

        let engine = PromptEngine::new().unwrap();
        let rendered = engine
            .render(PromptKind::System, VerificationType::PreviousVsCurrent, None, &ctx)
            .unwrap();
        assert!(rendered.contains("first verification"));
        assert!(!rendered.contains("hours ago"));
    }

    #[test]
    fn test_version_fallback_descending() {
        let mut engine = PromptEngine::new().unwrap();
        engine
            .register("layout-vs-checking", "v2", "system", "v2 system for {{machine.rowCount}} rows")
            .unwrap();

        // No explicit version: picks the highest registered (v2).
        let rendered = engine
            .render(PromptKind::System, VerificationType::LayoutVsChecking, None, &layout_context())
            .unwrap();
        assert!(rendered.starts_with("v2 system"));

        // Explicit v1 still resolves.
        let rendered = engine
            .render(PromptKind::System, VerificationType::LayoutVsChecking, Some("v1"), &layout_context())
            .unwrap();
        assert!(rendered.contains("vending machine auditor"));

        // Unknown version falls back to the highest registered.
        let rendered = engine
            .render(PromptKind::System, VerificationType::LayoutVsChecking, Some("v9"), &layout_context())
            .unwrap();
        assert!(rendered.starts_with("v2 system"));
    }

    #[test]
    fn test_turn_prompts_render_for_both_types() {
        let engine = PromptEngine::new().unwrap();
        for verification_type in [
            VerificationType::LayoutVsChecking,
            VerificationType::PreviousVsCurrent,
        ] {
            for kind in [PromptKind::Turn1, PromptKind::Turn2] {
                let rendered = engine
                    .render(kind, verification_type, None, &layout_context())
                    .unwrap();
                assert!(!rendered.is_empty());
            }
        }
        let turn2 = engine
            .render(PromptKind::Turn2, VerificationType::LayoutVsChecking, None, &layout_context())
            .unwrap();
        assert!(turn2.contains("discrepancies"));
        assert!(turn2.contains("totalDiscrepancies"));
    }
}
