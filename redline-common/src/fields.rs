//! Field values and record payloads
//!
//! Data contracts shared by the extraction, diff, staging, and commit
//! layers. A `RecordPayload` is an ordered field-name → value map; order
//! is the declaration order of the originating schema and is preserved
//! through serialization so staged artifacts reload exactly as saved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical value of a single record field
///
/// Values are comparable only within the same variant; any cross-variant
/// comparison is unequal. Numbers are finite f64 (canonicalization rejects
/// non-finite input), datetimes are UTC truncated to microsecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Null,
}

/// Declared kind of a schema field, the canonicalization hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    #[serde(alias = "datetime")]
    DateTime,
}

/// One named field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered field-name → value map for one record
///
/// Field names are unique; `set` replaces in place so the original
/// insertion order survives updates. Payloads are created once by the
/// extractor (or reloaded from storage) and treated as immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    schema_tag: String,
    source_identifier: Option<String>,
    entries: Vec<FieldEntry>,
}

impl RecordPayload {
    /// Create an empty payload for a schema
    pub fn new(schema_tag: &str, source_identifier: Option<String>) -> Self {
        Self {
            schema_tag: schema_tag.to_string(),
            source_identifier,
            entries: Vec::new(),
        }
    }

    /// Payload with no fields and no identifier
    pub fn empty(schema_tag: &str) -> Self {
        Self::new(schema_tag, None)
    }

    /// Sector schema this payload was extracted under
    pub fn schema_tag(&self) -> &str {
        &self.schema_tag
    }

    /// Record identifier carried by the upload, if any
    ///
    /// None marks a new-record candidate.
    pub fn source_identifier(&self) -> Option<&str> {
        self.source_identifier.as_deref()
    }

    pub fn set_source_identifier(&mut self, source_identifier: Option<String>) {
        self.source_identifier = source_identifier;
    }

    /// Insert or replace a field value, preserving insertion order
    pub fn set(&mut self, field_name: &str, value: FieldValue) {
        match self.entries.iter_mut().find(|e| e.name == field_name) {
            Some(entry) => entry.value = value,
            None => self.entries.push(FieldEntry {
                name: field_name.to_string(),
                value,
            }),
        }
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|e| e.name == field_name)
            .map(|e| &e.value)
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.entries.iter().any(|e| e.name == field_name)
    }

    /// Fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
