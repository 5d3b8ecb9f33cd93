//! Reconciliation committer
//!
//! Applies a reviewed artifact to the live record. The live record is
//! re-read and re-diffed against the staged base snapshot first, so a
//! record modified underneath the review in a field the reviewer was
//! evaluating refuses to commit instead of overwriting the concurrent
//! change. The persisted record is reached only through the `RecordStore`
//! seam, keeping the conflict logic independent of storage technology.

use async_trait::async_trait;
use redline_common::fields::{FieldValue, RecordPayload};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::diff::{diff, ChangeKind};
use crate::review::{Decision, ReviewDecisionSet, ReviewState};
use crate::staging::{StagedArtifact, StagingError, StagingStore};

/// Injected reader/writer seam over the persisted-record store
///
/// The caller must treat one `read` and the following `write` for the same
/// identifier as a single critical section (row lock or transaction
/// isolation); the engine does not provide that locking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the live record. A record that does not exist yet reads as an
    /// empty payload.
    async fn read(&self, record_identifier: &str) -> redline_common::Result<RecordPayload>;

    /// Apply the write set over the live record as a single all-or-nothing
    /// transaction. Fields outside the write set keep their live values.
    async fn write(
        &self,
        record_identifier: &str,
        schema_tag: &str,
        write_set: &[(String, FieldValue)],
    ) -> redline_common::Result<()>;
}

/// One field the live record changed while it was under review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictingField {
    pub field_name: String,
    /// Value captured in the base snapshot at staging time
    pub staged_base: Option<FieldValue>,
    /// Value in the live record now
    pub live: Option<FieldValue>,
}

/// Successful commit report
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub record_identifier: String,
    /// True when the identifier was minted for a new-record candidate
    pub created_record: bool,
    pub written_fields: Vec<String>,
}

/// Commit failure
#[derive(Error, Debug)]
pub enum CommitError {
    /// Decision set incomplete or not under review; a caller bug
    #[error("decision set is not ready to commit: {0}")]
    NotReady(String),

    /// The live record changed, in a reviewed field, since staging.
    /// Expected and recoverable: discard and re-stage, never force.
    #[error("record changed during review: {}", field_list(.fields))]
    Conflict { fields: Vec<ConflictingField> },

    /// The record store read or write failed; artifact left intact,
    /// retryable as-is
    #[error("record store failure: {0}")]
    Persistence(#[source] redline_common::Error),

    /// Staging store failure
    #[error(transparent)]
    Staging(#[from] StagingError),
}

fn field_list(fields: &[ConflictingField]) -> String {
    fields
        .iter()
        .map(|f| f.field_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Commit the accepted field changes of a reviewed artifact
///
/// Steps: verify readiness, resolve the target identifier (minting a UUID
/// for new-record candidates), re-read the live record, re-diff against the
/// staged base to detect concurrent modification, build the write set from
/// Accept decisions, write once, delete the artifact, mark the decision set
/// Committed. A retry after `Persistence` re-runs the conflict check fresh.
pub async fn commit(
    artifact: &StagedArtifact,
    decisions: &mut ReviewDecisionSet,
    records: &dyn RecordStore,
    staging: &StagingStore,
) -> Result<CommitOutcome, CommitError> {
    if decisions.artifact_id() != artifact.artifact_id {
        return Err(CommitError::NotReady(format!(
            "decision set belongs to artifact '{}'",
            decisions.artifact_id()
        )));
    }
    if decisions.state() != ReviewState::UnderReview {
        return Err(CommitError::NotReady(format!(
            "review state is {:?}",
            decisions.state()
        )));
    }
    if !decisions.is_ready_to_commit() {
        return Err(CommitError::NotReady(format!(
            "undecided fields: {}",
            decisions.undecided().join(", ")
        )));
    }

    let (record_identifier, created_record) = match &artifact.record_identifier {
        Some(id) => (id.clone(), false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let live = records
        .read(&record_identifier)
        .await
        .map_err(CommitError::Persistence)?;

    // Re-diff the live record against the staged base; a live change in a
    // field the artifact's own diff also touched is a conflict. Live
    // changes confined to fields the artifact marked Unchanged are
    // orthogonal edits and do not block.
    let live_diff = diff(&live, &artifact.base_snapshot);
    let mut conflicts = Vec::new();
    for change in live_diff.iter() {
        if change.kind == ChangeKind::Unchanged {
            continue;
        }
        let Some(staged) = artifact.diff.get(&change.field_name) else {
            continue;
        };
        if staged.kind != ChangeKind::Unchanged {
            conflicts.push(ConflictingField {
                field_name: change.field_name.clone(),
                staged_base: artifact.base_snapshot.get(&change.field_name).cloned(),
                live: live.get(&change.field_name).cloned(),
            });
        }
    }
    if !conflicts.is_empty() {
        warn!(
            "Commit refused for {}: live record changed in {}",
            artifact.artifact_id,
            field_list(&conflicts)
        );
        return Err(CommitError::Conflict { fields: conflicts });
    }

    // Accepted fields get the incoming value; Reject and undecided fields
    // keep their live value. Accept on a Removed field has no incoming
    // value and is skipped.
    let mut write_set: Vec<(String, FieldValue)> = Vec::new();
    for change in artifact.diff.iter() {
        if decisions.decision(&change.field_name) == Some(Decision::Accept) {
            if let Some(value) = &change.new_value {
                write_set.push((change.field_name.clone(), value.clone()));
            }
        }
    }

    // Exactly one write, also when the set is empty; the transactional
    // path stays uniform
    records
        .write(&record_identifier, &artifact.schema_tag, &write_set)
        .await
        .map_err(CommitError::Persistence)?;

    match staging.delete(&artifact.artifact_id).await {
        Ok(true) => {}
        Ok(false) => warn!(
            "Staged artifact {} was already deleted",
            artifact.artifact_id
        ),
        Err(e) => warn!(
            "Could not delete staged artifact {} after commit: {}",
            artifact.artifact_id, e
        ),
    }
    decisions.mark_committed();

    let written_fields: Vec<String> = write_set.into_iter().map(|(name, _)| name).collect();
    info!(
        "Committed {} field(s) to record {}",
        written_fields.len(),
        record_identifier
    );

    Ok(CommitOutcome {
        record_identifier,
        created_record,
        written_fields,
    })
}

/// Discard a staged artifact; the recovery path after a conflict
///
/// Idempotent: a lost delete race is logged, not an error. Returns whether
/// the artifact still existed.
pub async fn discard(
    artifact_id: &str,
    decisions: &mut ReviewDecisionSet,
    staging: &StagingStore,
) -> Result<bool, StagingError> {
    let existed = staging.delete(artifact_id).await?;
    if !existed {
        warn!("Staged artifact {} was already deleted", artifact_id);
    }
    decisions.mark_discarded();
    Ok(existed)
}
