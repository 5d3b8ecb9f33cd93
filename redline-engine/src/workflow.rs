//! Staging workflow orchestration
//!
//! Thin composition over the components: extract the upload, read the
//! current record, diff, build the artifact, save. The commit side lives in
//! `commit`; the discard helper here covers callers that never began a
//! review.

use redline_common::fields::RecordPayload;
use redline_common::time;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::commit::RecordStore;
use crate::diff::diff;
use crate::extract::{extract, ExtractError};
use crate::schema::{SchemaRegistry, SchemaResolution};
use crate::staging::{StagedArtifact, StagingError, StagingStore};

/// Staging workflow failure
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Validation problem with the uploaded file
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Live record could not be read
    #[error("record store failure: {0}")]
    Records(#[source] redline_common::Error),

    /// Artifact could not be persisted
    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Extract an upload, diff it against the current record, and stage the
/// result as a durable artifact
///
/// Identified uploads diff against the live record read at staging time
/// (that read becomes the base snapshot); new-record candidates diff
/// against an empty base, so every field shows as Added.
pub async fn stage_upload(
    cells: &[(String, Value)],
    resolution: &SchemaResolution,
    registry: &SchemaRegistry,
    fallback_identifier: Option<&str>,
    records: &dyn RecordStore,
    staging: &StagingStore,
) -> Result<StagedArtifact, WorkflowError> {
    let incoming = extract(cells, resolution, registry, fallback_identifier)?;

    let base = match incoming.source_identifier() {
        Some(id) => records.read(id).await.map_err(WorkflowError::Records)?,
        None => RecordPayload::empty(incoming.schema_tag()),
    };

    let changes = diff(&incoming, &base);
    info!(
        "Staging upload for record {:?}: {}",
        incoming.source_identifier(),
        changes.summary()
    );

    let artifact = StagedArtifact::build(incoming, base, changes, time::now());
    staging.save(&artifact).await?;
    Ok(artifact)
}

/// Discard a staged artifact without a review in progress
///
/// Idempotent per the staging store's delete contract; returns whether the
/// artifact still existed.
pub async fn discard_artifact(
    artifact_id: &str,
    staging: &StagingStore,
) -> Result<bool, StagingError> {
    let existed = staging.delete(artifact_id).await?;
    if !existed {
        warn!("Staged artifact {} was already deleted", artifact_id);
    }
    Ok(existed)
}
