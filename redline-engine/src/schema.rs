//! Sector form schemas
//!
//! A schema names the declared fields of one feedback form (sector), the
//! canonicalization hint per field, and which field carries the record
//! identifier. Built-in sector defaults ship as data; deployments may merge
//! TOML-declared schemas over them. No business logic lives here.

use once_cell::sync::Lazy;
use redline_common::fields::FieldKind;
use redline_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// One declared field of a form schema
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Decimal places to pre-round Number fields to during canonicalization
    #[serde(default)]
    pub precision: Option<u32>,
}

/// Declared shape of one sector's feedback form
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormSchema {
    pub tag: String,
    pub display_name: String,
    /// Field carrying the record identifier in uploads
    pub identifier_field: String,
    pub fields: Vec<FieldSpec>,
}

/// Outcome of resolving an upload's schema tag, supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaResolution {
    Resolved(String),
    Ambiguous { candidates: Vec<String> },
    Unresolved,
}

/// TOML schema file contents
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    schema: Vec<FormSchema>,
}

fn field(name: &str, kind: FieldKind, precision: Option<u32>) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        kind,
        precision,
    }
}

/// Built-in sector schemas, overridable per deployment via TOML
static BUILTIN_SCHEMAS: Lazy<Vec<FormSchema>> = Lazy::new(|| {
    vec![
        FormSchema {
            tag: "landfill".to_string(),
            display_name: "Landfill Feedback".to_string(),
            identifier_field: "facility_id".to_string(),
            fields: vec![
                field("facility_id", FieldKind::Text, None),
                field("facility_name", FieldKind::Text, None),
                field("waste_tons", FieldKind::Number, Some(2)),
                field("inspection_date", FieldKind::DateTime, None),
                field("compliant", FieldKind::Boolean, None),
                field("notes", FieldKind::Text, None),
            ],
        },
        FormSchema {
            tag: "oil_gas".to_string(),
            display_name: "Oil & Gas Feedback".to_string(),
            identifier_field: "well_id".to_string(),
            fields: vec![
                field("well_id", FieldKind::Text, None),
                field("operator_name", FieldKind::Text, None),
                field("output_bbl", FieldKind::Number, Some(1)),
                field("reported_at", FieldKind::DateTime, None),
                field("active", FieldKind::Boolean, None),
                field("remarks", FieldKind::Text, None),
            ],
        },
        FormSchema {
            tag: "dairy".to_string(),
            display_name: "Dairy Feedback".to_string(),
            identifier_field: "herd_id".to_string(),
            fields: vec![
                field("herd_id", FieldKind::Text, None),
                field("farm_name", FieldKind::Text, None),
                field("head_count", FieldKind::Number, Some(0)),
                field("milk_liters", FieldKind::Number, Some(1)),
                field("sampled_at", FieldKind::DateTime, None),
                field("notes", FieldKind::Text, None),
            ],
        },
    ]
});

/// Registry of known form schemas
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<FormSchema>,
}

impl SchemaRegistry {
    /// Registry holding only the built-in sector schemas
    pub fn builtin() -> Self {
        Self {
            schemas: BUILTIN_SCHEMAS.clone(),
        }
    }

    /// Empty registry, for deployments defining every schema in TOML
    pub fn empty() -> Self {
        Self {
            schemas: Vec::new(),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&FormSchema> {
        self.schemas.iter().find(|s| s.tag == tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.tag.as_str()).collect()
    }

    /// Resolve an optional tag hint to a schema tag
    ///
    /// Exact match wins; otherwise a case-insensitive prefix match over the
    /// known tags. Multiple prefix candidates are Ambiguous, zero are
    /// Unresolved. The extractor turns those into loud failures.
    pub fn resolve(&self, hint: Option<&str>) -> SchemaResolution {
        let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) else {
            return SchemaResolution::Unresolved;
        };

        if self.schemas.iter().any(|s| s.tag == hint) {
            return SchemaResolution::Resolved(hint.to_string());
        }

        let lowered = hint.to_ascii_lowercase();
        let candidates: Vec<String> = self
            .schemas
            .iter()
            .filter(|s| s.tag.to_ascii_lowercase().starts_with(&lowered))
            .map(|s| s.tag.clone())
            .collect();

        match candidates.as_slice() {
            [] => SchemaResolution::Unresolved,
            [single] => SchemaResolution::Resolved(single.clone()),
            _ => SchemaResolution::Ambiguous { candidates },
        }
    }

    /// Merge TOML-declared schemas over the registry
    ///
    /// A loaded schema with an existing tag replaces it (logged); new tags
    /// append in file order.
    pub fn merge_from_toml(&mut self, text: &str) -> Result<()> {
        let file: SchemaFile = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Invalid schema file: {}", e)))?;

        for schema in file.schema {
            match self.schemas.iter_mut().find(|s| s.tag == schema.tag) {
                Some(existing) => {
                    warn!(
                        "Schema '{}' overrides an existing definition ({} fields -> {})",
                        schema.tag,
                        existing.fields.len(),
                        schema.fields.len()
                    );
                    *existing = schema;
                }
                None => {
                    info!("Loaded schema '{}' ({} fields)", schema.tag, schema.fields.len());
                    self.schemas.push(schema);
                }
            }
        }
        Ok(())
    }

    /// Merge a TOML schema file from disk
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.merge_from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_are_well_formed() {
        let registry = SchemaRegistry::builtin();
        for tag in ["landfill", "oil_gas", "dairy"] {
            let schema = registry.get(tag).unwrap();
            assert!(!schema.fields.is_empty());
            // The identifier field must be one of the declared fields
            assert!(
                schema.fields.iter().any(|f| f.name == schema.identifier_field),
                "identifier field missing from '{}'",
                tag
            );
        }
    }

    #[test]
    fn test_resolve_exact_tag() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(
            registry.resolve(Some("landfill")),
            SchemaResolution::Resolved("landfill".to_string())
        );
    }

    #[test]
    fn test_resolve_unique_prefix() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(
            registry.resolve(Some("oil")),
            SchemaResolution::Resolved("oil_gas".to_string())
        );
    }

    #[test]
    fn test_resolve_missing_or_blank_hint_is_unresolved() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(registry.resolve(None), SchemaResolution::Unresolved);
        assert_eq!(registry.resolve(Some("   ")), SchemaResolution::Unresolved);
        assert_eq!(registry.resolve(Some("mining")), SchemaResolution::Unresolved);
    }

    #[test]
    fn test_resolve_shared_prefix_is_ambiguous() {
        let mut registry = SchemaRegistry::builtin();
        registry
            .merge_from_toml(
                r#"
                [[schema]]
                tag = "dairy_processing"
                display_name = "Dairy Processing"
                identifier_field = "plant_id"

                [[schema.fields]]
                name = "plant_id"
                kind = "text"
                "#,
            )
            .unwrap();

        match registry.resolve(Some("dair")) {
            SchemaResolution::Ambiguous { candidates } => {
                assert_eq!(candidates, vec!["dairy".to_string(), "dairy_processing".to_string()]);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_replaces_same_tag() {
        let mut registry = SchemaRegistry::builtin();
        registry
            .merge_from_toml(
                r#"
                [[schema]]
                tag = "landfill"
                display_name = "Landfill (site-specific)"
                identifier_field = "site_code"

                [[schema.fields]]
                name = "site_code"
                kind = "text"

                [[schema.fields]]
                name = "waste_tons"
                kind = "number"
                precision = 2
                "#,
            )
            .unwrap();

        let schema = registry.get("landfill").unwrap();
        assert_eq!(schema.identifier_field, "site_code");
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.fields[1].precision, Some(2));
        // Other built-ins untouched
        assert!(registry.get("dairy").is_some());
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let mut registry = SchemaRegistry::builtin();
        let err = registry.merge_from_toml("[[schema]]\ntag = 3\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
