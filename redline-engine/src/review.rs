//! Review and approval state machine
//!
//! Tracks the reviewer's per-field accept/reject choices for one staged
//! artifact. States: Staged → UnderReview → {Committed, Discarded};
//! terminal states are final. All mutation is local to the decision set;
//! the engine never persists decisions (the serde derives let an
//! integration layer do so across requests if it wants to).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::staging::StagedArtifact;

/// Reviewer's verdict on one field change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

/// Review lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Artifact staged, review not yet begun
    Staged,
    /// Decisions being made
    UnderReview,
    /// Accepted changes written to the record (terminal)
    Committed,
    /// Artifact thrown away without writing (terminal)
    Discarded,
}

impl ReviewState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewState::Committed | ReviewState::Discarded)
    }
}

/// Review-time misuse; a caller bug, not an expected runtime condition
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("field '{0}' is not part of the staged diff")]
    UnknownField(String),
}

/// Per-field decisions for one staged artifact
///
/// Only Added/Changed fields require an explicit decision; Unchanged and
/// Removed fields never block commit. `begin_review` defaults every
/// required field to Accept, so the common all-accept review is one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecisionSet {
    artifact_id: String,
    state: ReviewState,
    /// Every field name in the artifact's diff
    known_fields: Vec<String>,
    /// The Added/Changed subset, in diff order
    required_fields: Vec<String>,
    decisions: BTreeMap<String, Decision>,
}

impl ReviewDecisionSet {
    /// Start reviewing an artifact
    pub fn begin_review(artifact: &StagedArtifact) -> Self {
        let known_fields: Vec<String> = artifact
            .diff
            .iter()
            .map(|c| c.field_name.clone())
            .collect();
        let required_fields: Vec<String> = artifact
            .diff
            .requires_decision()
            .map(|c| c.field_name.clone())
            .collect();
        let decisions = required_fields
            .iter()
            .map(|f| (f.clone(), Decision::Accept))
            .collect();

        Self {
            artifact_id: artifact.artifact_id.clone(),
            state: ReviewState::UnderReview,
            known_fields,
            required_fields,
            decisions,
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    pub fn decision(&self, field_name: &str) -> Option<Decision> {
        self.decisions.get(field_name).copied()
    }

    /// Fields that still require a decision
    pub fn undecided(&self) -> Vec<&str> {
        self.required_fields
            .iter()
            .filter(|f| !self.decisions.contains_key(f.as_str()))
            .map(|f| f.as_str())
            .collect()
    }

    /// Record a decision for a field in the artifact's diff
    pub fn set_decision(
        &mut self,
        field_name: &str,
        decision: Decision,
    ) -> Result<(), ReviewError> {
        self.check_known(field_name)?;
        self.decisions.insert(field_name.to_string(), decision);
        Ok(())
    }

    /// Return a field to undecided
    pub fn clear_decision(&mut self, field_name: &str) -> Result<(), ReviewError> {
        self.check_known(field_name)?;
        self.decisions.remove(field_name);
        Ok(())
    }

    /// Complete iff every Added/Changed field has an explicit decision
    pub fn is_ready_to_commit(&self) -> bool {
        self.required_fields
            .iter()
            .all(|f| self.decisions.contains_key(f.as_str()))
    }

    pub fn mark_committed(&mut self) {
        self.transition(ReviewState::Committed);
    }

    pub fn mark_discarded(&mut self) {
        self.transition(ReviewState::Discarded);
    }

    fn transition(&mut self, next: ReviewState) {
        if self.state.is_terminal() {
            warn!(
                "Ignoring transition {:?} -> {:?} for artifact {}",
                self.state, next, self.artifact_id
            );
            return;
        }
        self.state = next;
    }

    fn check_known(&self, field_name: &str) -> Result<(), ReviewError> {
        if self.known_fields.iter().any(|f| f == field_name) {
            Ok(())
        } else {
            Err(ReviewError::UnknownField(field_name.to_string()))
        }
    }
}
