//! # Redline Engine
//!
//! Staged upload review and reconciliation engine for spreadsheet-based
//! feedback submissions. An upload is canonicalized into a field-value map,
//! diffed against the persisted record, staged as a durable reviewable
//! artifact, reviewed field by field, and committed only if the live record
//! has not been modified underneath the review.
//!
//! Pipeline: extract → diff → stage → review → commit.

pub mod codec;
pub mod commit;
pub mod db;
pub mod diff;
pub mod extract;
pub mod review;
pub mod schema;
pub mod staging;
pub mod workflow;

pub use codec::{canonicalize, serialize, CodecError};
pub use commit::{CommitError, CommitOutcome, ConflictingField, RecordStore};
pub use diff::{diff, ChangeKind, DiffResult, FieldChange};
pub use extract::{extract, ExtractError, UploadDocument};
pub use review::{Decision, ReviewDecisionSet, ReviewError, ReviewState};
pub use schema::{FieldSpec, FormSchema, SchemaRegistry, SchemaResolution};
pub use staging::{ArtifactSummary, StagedArtifact, StagingError, StagingStore};
