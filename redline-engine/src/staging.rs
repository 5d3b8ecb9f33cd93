//! Staged artifact persistence
//!
//! A staged artifact is the durable, reviewable snapshot of one upload: the
//! extracted payload, the base state it was diffed against, and the diff
//! itself. Artifacts are write-once; the only mutations are whole-artifact
//! create and delete, so concurrent list/load of the same artifact is safe.

use chrono::{DateTime, Utc};
use redline_common::fields::RecordPayload;
use redline_common::time;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

use crate::diff::DiffResult;

/// Staging store failure
#[derive(Error, Debug)]
pub enum StagingError {
    /// An artifact with this id already exists; never silently overwritten
    #[error("staged artifact id '{0}' already exists")]
    IdentityConflict(String),

    /// No artifact under this id
    #[error("staged artifact '{0}' not found")]
    NotFound(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored artifact could not be serialized or parsed back
    #[error("corrupt staged artifact: {0}")]
    Corrupt(String),
}

/// Durable snapshot of one upload under review
///
/// Write-once: created at staging time, deleted on discard or successful
/// commit, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedArtifact {
    pub artifact_id: String,
    /// Target record; None marks a new-record candidate
    pub record_identifier: Option<String>,
    pub schema_tag: String,
    pub incoming_payload: RecordPayload,
    /// Persisted record's field values captured at staging time; the
    /// reference point for conflict detection at commit
    pub base_snapshot: RecordPayload,
    pub diff: DiffResult,
    pub created_at: DateTime<Utc>,
}

impl StagedArtifact {
    /// Assemble an artifact from its parts, deriving the artifact id
    ///
    /// `created_at` is truncated to microseconds so the artifact reloads
    /// exactly as saved.
    pub fn build(
        incoming_payload: RecordPayload,
        base_snapshot: RecordPayload,
        diff: DiffResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        let created_at = time::truncate_to_micros(created_at);
        let record_identifier = incoming_payload.source_identifier().map(str::to_string);
        let schema_tag = incoming_payload.schema_tag().to_string();
        let artifact_id = derive_artifact_id(record_identifier.as_deref(), created_at);
        Self {
            artifact_id,
            record_identifier,
            schema_tag,
            incoming_payload,
            base_snapshot,
            diff,
            created_at,
        }
    }
}

/// Derive a unique artifact id from the record identifier and staging time
///
/// Unidentified uploads use the "unassigned" stem so new-record candidates
/// stay visible in listings.
pub fn derive_artifact_id(record_identifier: Option<&str>, created_at: DateTime<Utc>) -> String {
    let stem = match record_identifier {
        Some(id) if !id.trim().is_empty() => sanitize(id),
        _ => "unassigned".to_string(),
    };
    format!("{}-{}", stem, created_at.format("%Y%m%dT%H%M%S%.6fZ"))
}

fn sanitize(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Listing entry; loads without touching the payload/diff columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub artifact_id: String,
    pub record_identifier: Option<String>,
    pub schema_tag: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed staging store
pub struct StagingStore {
    pool: SqlitePool,
}

impl StagingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an artifact atomically
    ///
    /// A single INSERT, so no partial artifact is ever visible to a
    /// concurrent load. An existing id is an `IdentityConflict`.
    pub async fn save(&self, artifact: &StagedArtifact) -> Result<(), StagingError> {
        let incoming = serde_json::to_string(&artifact.incoming_payload)
            .map_err(|e| StagingError::Corrupt(format!("serialize incoming payload: {}", e)))?;
        let base = serde_json::to_string(&artifact.base_snapshot)
            .map_err(|e| StagingError::Corrupt(format!("serialize base snapshot: {}", e)))?;
        let diff = serde_json::to_string(&artifact.diff)
            .map_err(|e| StagingError::Corrupt(format!("serialize diff: {}", e)))?;
        let created_at = time::format_utc_micros(artifact.created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO staged_artifacts (
                artifact_id, record_identifier, schema_tag,
                incoming_payload, base_snapshot, diff, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&artifact.artifact_id)
        .bind(&artifact.record_identifier)
        .bind(&artifact.schema_tag)
        .bind(&incoming)
        .bind(&base)
        .bind(&diff)
        .bind(&created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!("Staged artifact {} saved", artifact.artifact_id);
                Ok(())
            }
            Err(e) => {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return Err(StagingError::IdentityConflict(
                            artifact.artifact_id.clone(),
                        ));
                    }
                }
                Err(StagingError::Database(e))
            }
        }
    }

    /// Load a full artifact
    pub async fn load(&self, artifact_id: &str) -> Result<StagedArtifact, StagingError> {
        let row = sqlx::query(
            r#"
            SELECT artifact_id, record_identifier, schema_tag,
                   incoming_payload, base_snapshot, diff, created_at
            FROM staged_artifacts
            WHERE artifact_id = ?
            "#,
        )
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| StagingError::NotFound(artifact_id.to_string()))?;

        let incoming: String = row.get("incoming_payload");
        let base: String = row.get("base_snapshot");
        let diff: String = row.get("diff");
        let created_at: String = row.get("created_at");

        Ok(StagedArtifact {
            artifact_id: row.get("artifact_id"),
            record_identifier: row.get("record_identifier"),
            schema_tag: row.get("schema_tag"),
            incoming_payload: serde_json::from_str(&incoming)
                .map_err(|e| StagingError::Corrupt(format!("incoming payload: {}", e)))?,
            base_snapshot: serde_json::from_str(&base)
                .map_err(|e| StagingError::Corrupt(format!("base snapshot: {}", e)))?,
            diff: serde_json::from_str(&diff)
                .map_err(|e| StagingError::Corrupt(format!("diff: {}", e)))?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    /// List artifact summaries, ordered by creation time then id
    pub async fn list(&self) -> Result<Vec<ArtifactSummary>, StagingError> {
        let rows = sqlx::query(
            r#"
            SELECT artifact_id, record_identifier, schema_tag, created_at
            FROM staged_artifacts
            ORDER BY created_at, artifact_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let created_at: String = row.get("created_at");
            summaries.push(ArtifactSummary {
                artifact_id: row.get("artifact_id"),
                record_identifier: row.get("record_identifier"),
                schema_tag: row.get("schema_tag"),
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(summaries)
    }

    /// Delete an artifact; `Ok(false)` when already gone
    ///
    /// Discard races must not crash a reviewer surface, so a second delete
    /// is not an error.
    pub async fn delete(&self, artifact_id: &str) -> Result<bool, StagingError> {
        let result = sqlx::query("DELETE FROM staged_artifacts WHERE artifact_id = ?")
            .bind(artifact_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Staged artifact {} deleted", artifact_id);
        } else {
            debug!("Staged artifact {} already absent", artifact_id);
        }
        Ok(deleted)
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StagingError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StagingError::Corrupt(format!("timestamp '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_id_combines_identifier_and_timestamp() {
        let created_at = Utc
            .with_ymd_and_hms(2024, 5, 2, 9, 30, 15)
            .single()
            .expect("valid timestamp");
        assert_eq!(
            derive_artifact_id(Some("f-17"), created_at),
            "f-17-20240502T093015.000000Z"
        );
    }

    #[test]
    fn test_artifact_id_sanitizes_awkward_identifiers() {
        let created_at = Utc
            .with_ymd_and_hms(2024, 5, 2, 9, 30, 15)
            .single()
            .expect("valid timestamp");
        let id = derive_artifact_id(Some("well #7/a"), created_at);
        assert!(id.starts_with("well__7_a-"));
    }

    #[test]
    fn test_missing_identifier_uses_unassigned_stem() {
        let created_at = Utc
            .with_ymd_and_hms(2024, 5, 2, 9, 30, 15)
            .single()
            .expect("valid timestamp");
        assert!(derive_artifact_id(None, created_at).starts_with("unassigned-"));
        assert!(derive_artifact_id(Some("  "), created_at).starts_with("unassigned-"));
    }

    #[test]
    fn test_build_truncates_creation_time_to_micros() {
        let created_at = Utc
            .with_ymd_and_hms(2024, 5, 2, 9, 30, 15)
            .single()
            .and_then(|d| chrono::Timelike::with_nanosecond(&d, 123_456_789))
            .expect("valid timestamp");
        let artifact = StagedArtifact::build(
            RecordPayload::new("landfill", Some("f-17".to_string())),
            RecordPayload::empty("landfill"),
            DiffResult::default(),
            created_at,
        );
        assert_eq!(
            chrono::Timelike::nanosecond(&artifact.created_at),
            123_456_000
        );
        assert_eq!(artifact.record_identifier.as_deref(), Some("f-17"));
        assert_eq!(artifact.schema_tag, "landfill");
    }
}
