//! Record extraction from uploaded documents
//!
//! Pure transformation: an iterable of (field name, raw value) cell pairs
//! plus a caller-resolved schema tag becomes one canonical `RecordPayload`,
//! or one failure value. No partial payload is ever returned.

use redline_common::fields::{FieldValue, RecordPayload};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

use crate::codec::{self, CodecError};
use crate::schema::{SchemaRegistry, SchemaResolution};

/// Extraction failure; aborts the whole upload
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A cell could not be coerced to its declared kind
    #[error("field '{field}': {source}")]
    TypeMismatch {
        field: String,
        #[source]
        source: CodecError,
    },

    /// The schema hint matched more than one known schema
    #[error("ambiguous schema, candidates: {}", .candidates.join(", "))]
    AmbiguousSchema { candidates: Vec<String> },

    /// No schema could be resolved for the upload
    #[error("unresolved schema (tag: {tag:?})")]
    UnresolvedSchema { tag: Option<String> },

    /// Invariant guard: a resolved schema declaring no fields
    #[error("schema '{0}' declares no fields")]
    EmptySchema(String),

    /// The upload is not a flat JSON object
    #[error("upload document must be a flat JSON object")]
    InvalidDocument,
}

/// Adapter from a flat JSON upload document to ordered cell pairs
///
/// The reserved `_schema` key, if present, is lifted out as a schema tag
/// hint rather than treated as a cell.
#[derive(Debug, Clone)]
pub struct UploadDocument {
    cells: Vec<(String, Value)>,
    schema_hint: Option<String>,
}

impl UploadDocument {
    /// Reserved key carrying the schema tag hint
    pub const SCHEMA_HINT_KEY: &'static str = "_schema";

    pub fn from_json(document: &Value) -> Result<Self, ExtractError> {
        let Value::Object(map) = document else {
            return Err(ExtractError::InvalidDocument);
        };

        let mut cells = Vec::with_capacity(map.len());
        let mut schema_hint = None;
        for (name, value) in map {
            if name == Self::SCHEMA_HINT_KEY {
                schema_hint = value.as_str().map(str::to_string);
            } else {
                cells.push((name.clone(), value.clone()));
            }
        }
        Ok(Self { cells, schema_hint })
    }

    pub fn cells(&self) -> &[(String, Value)] {
        &self.cells
    }

    pub fn schema_hint(&self) -> Option<&str> {
        self.schema_hint.as_deref()
    }
}

/// Extract a canonical payload from raw cell pairs
///
/// Iterates the resolved schema's declared fields in declaration order,
/// canonicalizing each raw cell; a missing cell reads as blank (Null).
/// The record identifier comes from the schema's identifier field when it
/// carries a value, else from `fallback_identifier`; when both are present
/// and disagree the explicit field wins and the conflict is logged as a
/// warning, not an error.
pub fn extract(
    cells: &[(String, Value)],
    resolution: &SchemaResolution,
    registry: &SchemaRegistry,
    fallback_identifier: Option<&str>,
) -> Result<RecordPayload, ExtractError> {
    let tag = match resolution {
        SchemaResolution::Resolved(tag) => tag.as_str(),
        SchemaResolution::Ambiguous { candidates } => {
            return Err(ExtractError::AmbiguousSchema {
                candidates: candidates.clone(),
            })
        }
        SchemaResolution::Unresolved => {
            return Err(ExtractError::UnresolvedSchema { tag: None })
        }
    };

    let schema = registry.get(tag).ok_or_else(|| ExtractError::UnresolvedSchema {
        tag: Some(tag.to_string()),
    })?;
    if schema.fields.is_empty() {
        return Err(ExtractError::EmptySchema(tag.to_string()));
    }

    // Messy sheets may repeat a field name; last occurrence wins
    let mut raw: HashMap<&str, &Value> = HashMap::with_capacity(cells.len());
    for (name, value) in cells {
        if raw.insert(name.as_str(), value).is_some() {
            warn!("Duplicate field '{}' in upload, keeping the last occurrence", name);
        }
    }

    let mut payload = RecordPayload::new(tag, None);
    for spec in &schema.fields {
        let value = match raw.get(spec.name.as_str()) {
            Some(cell) => codec::canonicalize(cell, spec.kind, spec.precision).map_err(
                |source| ExtractError::TypeMismatch {
                    field: spec.name.clone(),
                    source,
                },
            )?,
            None => FieldValue::Null,
        };
        payload.set(&spec.name, value);
    }

    let explicit = payload
        .get(&schema.identifier_field)
        .and_then(identifier_text);
    let identifier = match (explicit, fallback_identifier) {
        (Some(explicit), Some(fallback)) => {
            if explicit != fallback {
                warn!(
                    "Record identifier conflict: field '{}' = '{}' overrides fallback '{}'",
                    schema.identifier_field, explicit, fallback
                );
            }
            Some(explicit)
        }
        (Some(explicit), None) => Some(explicit),
        (None, Some(fallback)) => Some(fallback.to_string()),
        (None, None) => None,
    };
    payload.set_source_identifier(identifier);

    Ok(payload)
}

/// Identifier rendering for the declared identifier field.
/// Sheets sometimes carry numeric identifier columns.
fn identifier_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Text(s) if !s.is_empty() => Some(s.clone()),
        FieldValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        FieldValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
