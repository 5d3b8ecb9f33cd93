//! Field-level diff between record payloads
//!
//! Pure comparison: given an incoming payload and the currently persisted
//! base, classify every field in the union of both as Added, Removed,
//! Changed, or Unchanged. Unchanged entries are retained so a reviewer sees
//! full field coverage, not just the deltas.

use redline_common::fields::{FieldValue, RecordPayload};
use serde::{Deserialize, Serialize};

/// Classification of one field between incoming and base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Field present only in the incoming payload
    Added,
    /// Field present only in the base
    Removed,
    /// Present on both sides with unequal values (Null vs non-null included)
    Changed,
    /// Present on both sides with equal values (Null vs Null included)
    Unchanged,
}

/// One field's change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    pub prior_value: Option<FieldValue>,
    pub new_value: Option<FieldValue>,
    pub kind: ChangeKind,
}

impl FieldChange {
    /// Kind is a pure function of (prior, new) under FieldValue equality.
    /// Absence from the map yields Added/Removed; a present Null is a value.
    pub fn classify(prior: Option<&FieldValue>, new: Option<&FieldValue>) -> ChangeKind {
        match (prior, new) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Removed,
            (Some(p), Some(n)) if p == n => ChangeKind::Unchanged,
            (Some(_), Some(_)) => ChangeKind::Changed,
            (None, None) => ChangeKind::Unchanged,
        }
    }

    /// Added and Changed fields require an explicit reviewer decision
    pub fn requires_decision(&self) -> bool {
        matches!(self.kind, ChangeKind::Added | ChangeKind::Changed)
    }
}

/// Ordered diff covering the union of both payloads' field names
///
/// Incoming fields come first in their original order, then base-only
/// fields in base order. Every field name appears exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    changes: Vec<FieldChange>,
}

/// Per-kind counts for logging and display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} changed, {} unchanged",
            self.added, self.removed, self.changed, self.unchanged
        )
    }
}

impl DiffResult {
    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field_name == field_name)
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.get(field_name).is_some()
    }

    /// Fields requiring an explicit reviewer decision (Added/Changed)
    pub fn requires_decision(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(|c| c.requires_decision())
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for change in &self.changes {
            match change.kind {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Removed => summary.removed += 1,
                ChangeKind::Changed => summary.changed += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Diff two payloads, incoming against base
///
/// Deterministic and order-stable: identical inputs produce identical
/// output in identical order.
pub fn diff(incoming: &RecordPayload, base: &RecordPayload) -> DiffResult {
    let mut changes = Vec::with_capacity(incoming.len() + base.len());

    for (name, value) in incoming.iter() {
        let prior = base.get(name);
        changes.push(FieldChange {
            field_name: name.to_string(),
            prior_value: prior.cloned(),
            new_value: Some(value.clone()),
            kind: FieldChange::classify(prior, Some(value)),
        });
    }

    for (name, value) in base.iter() {
        if !incoming.contains(name) {
            changes.push(FieldChange {
                field_name: name.to_string(),
                prior_value: Some(value.clone()),
                new_value: None,
                kind: ChangeKind::Removed,
            });
        }
    }

    DiffResult { changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(fields: &[(&str, FieldValue)]) -> RecordPayload {
        let mut payload = RecordPayload::new("landfill", None);
        for (name, value) in fields {
            payload.set(name, value.clone());
        }
        payload
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_diff_against_self_is_all_unchanged() {
        let a = payload(&[
            ("name", text("Acme")),
            ("tons", FieldValue::Number(8.0)),
            ("notes", FieldValue::Null),
        ]);
        let result = diff(&a, &a);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|c| c.kind == ChangeKind::Unchanged));
    }

    #[test]
    fn test_changed_field_keeps_both_values() {
        // Incoming tons 10 over base tons 8
        let incoming = payload(&[("name", text("Acme")), ("tons", FieldValue::Number(10.0))]);
        let base = payload(&[("name", text("Acme")), ("tons", FieldValue::Number(8.0))]);

        let result = diff(&incoming, &base);
        let kinds: Vec<ChangeKind> = result.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Unchanged, ChangeKind::Changed]);

        let tons = result.get("tons").unwrap();
        assert_eq!(tons.prior_value, Some(FieldValue::Number(8.0)));
        assert_eq!(tons.new_value, Some(FieldValue::Number(10.0)));
    }

    #[test]
    fn test_field_only_in_incoming_is_added() {
        let incoming = payload(&[("name", text("Acme")), ("region", text("West"))]);
        let base = payload(&[("name", text("Acme"))]);

        let result = diff(&incoming, &base);
        let region = result.get("region").unwrap();
        assert_eq!(region.kind, ChangeKind::Added);
        assert_eq!(region.prior_value, None);
        assert_eq!(region.new_value, Some(text("West")));
    }

    #[test]
    fn test_field_only_in_base_is_removed_and_ordered_last() {
        let incoming = payload(&[("name", text("Acme"))]);
        let base = payload(&[("name", text("Acme")), ("legacy", text("x"))]);

        let result = diff(&incoming, &base);
        let names: Vec<&str> = result.iter().map(|c| c.field_name.as_str()).collect();
        assert_eq!(names, vec!["name", "legacy"]);
        assert_eq!(result.get("legacy").unwrap().kind, ChangeKind::Removed);
    }

    #[test]
    fn test_null_versus_null_is_unchanged() {
        let incoming = payload(&[("notes", FieldValue::Null)]);
        let base = payload(&[("notes", FieldValue::Null)]);
        assert_eq!(
            diff(&incoming, &base).get("notes").unwrap().kind,
            ChangeKind::Unchanged
        );
    }

    #[test]
    fn test_null_versus_value_is_changed_not_added() {
        let incoming = payload(&[("notes", FieldValue::Null)]);
        let base = payload(&[("notes", text("ok"))]);
        assert_eq!(
            diff(&incoming, &base).get("notes").unwrap().kind,
            ChangeKind::Changed
        );
    }

    #[test]
    fn test_cross_tag_values_are_changed() {
        let incoming = payload(&[("tons", text("8"))]);
        let base = payload(&[("tons", FieldValue::Number(8.0))]);
        assert_eq!(
            diff(&incoming, &base).get("tons").unwrap().kind,
            ChangeKind::Changed
        );
    }

    #[test]
    fn test_diff_is_anti_symmetric() {
        let a = payload(&[
            ("name", text("Acme")),
            ("tons", FieldValue::Number(10.0)),
            ("region", text("West")),
        ]);
        let b = payload(&[
            ("name", text("Acme")),
            ("tons", FieldValue::Number(8.0)),
            ("legacy", text("x")),
        ]);

        let forward = diff(&a, &b);
        let backward = diff(&b, &a);
        assert_eq!(forward.len(), backward.len());

        for change in forward.iter() {
            let mirrored = backward.get(&change.field_name).unwrap();
            let expected_kind = match change.kind {
                ChangeKind::Added => ChangeKind::Removed,
                ChangeKind::Removed => ChangeKind::Added,
                other => other,
            };
            assert_eq!(mirrored.kind, expected_kind);
            assert_eq!(mirrored.prior_value, change.new_value);
            assert_eq!(mirrored.new_value, change.prior_value);
        }
    }

    #[test]
    fn test_requires_decision_covers_added_and_changed_only() {
        let incoming = payload(&[
            ("name", text("Acme")),
            ("tons", FieldValue::Number(10.0)),
            ("region", text("West")),
        ]);
        let base = payload(&[
            ("name", text("Acme")),
            ("tons", FieldValue::Number(8.0)),
            ("legacy", text("x")),
        ]);

        let result = diff(&incoming, &base);
        let required: Vec<&str> = result
            .requires_decision()
            .map(|c| c.field_name.as_str())
            .collect();
        assert_eq!(required, vec!["tons", "region"]);

        let summary = result.summary();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.unchanged, 1);
    }
}
