//! redline - operator CLI for the reconciliation engine
//!
//! Drives the full staging workflow against the configured SQLite database:
//! stage an upload, list and inspect staged artifacts, preview decisions,
//! commit, discard. Decision state is never persisted; `decide` and
//! `commit` reconstruct it from the Accept defaults plus --accept/--reject
//! flags.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redline_common::config;
use redline_common::fields::FieldValue;
use redline_engine::commit::{self, CommitError};
use redline_engine::db::records::SqliteRecordStore;
use redline_engine::extract::UploadDocument;
use redline_engine::review::{Decision, ReviewDecisionSet};
use redline_engine::schema::SchemaRegistry;
use redline_engine::staging::StagingStore;
use redline_engine::{codec, db, workflow};

/// Command-line arguments for redline
#[derive(Parser, Debug)]
#[command(name = "redline")]
#[command(about = "Staged upload review and reconciliation engine")]
#[command(version)]
struct Args {
    /// Data directory holding the redline database
    #[arg(short, long, env = "REDLINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Extra schema definitions (TOML), merged over the built-in sector schemas
    #[arg(long)]
    schema_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage an uploaded JSON document for review
    Stage {
        /// Path to the upload (flat JSON object)
        file: PathBuf,

        /// Schema tag, overriding the document's `_schema` hint
        #[arg(long)]
        schema: Option<String>,

        /// Fallback record identifier if the document carries none
        #[arg(long)]
        fallback_id: Option<String>,
    },
    /// List staged artifacts
    List,
    /// Show a staged artifact's diff
    Show { artifact_id: String },
    /// Preview the decision state for a staged artifact
    Decide {
        artifact_id: String,

        /// Accept a field change (repeatable)
        #[arg(long)]
        accept: Vec<String>,

        /// Reject a field change (repeatable)
        #[arg(long)]
        reject: Vec<String>,
    },
    /// Commit accepted changes to the live record
    Commit {
        artifact_id: String,

        /// Accept a field change (repeatable; Added/Changed default to accept)
        #[arg(long)]
        accept: Vec<String>,

        /// Reject a field change (repeatable)
        #[arg(long)]
        reject: Vec<String>,
    },
    /// Discard a staged artifact
    Discard { artifact_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir.as_deref());
    let db_path = config::database_path(&data_dir);
    info!("Database: {}", db_path.display());

    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    let staging = StagingStore::new(pool.clone());
    let records = SqliteRecordStore::new(pool);

    let mut registry = SchemaRegistry::builtin();
    let schema_file = args
        .schema_file
        .or_else(|| config::load_config().ok().and_then(|c| c.schema_file));
    if let Some(path) = schema_file {
        registry
            .load_file(&path)
            .with_context(|| format!("Failed to load schema file {}", path.display()))?;
    }

    match args.command {
        Command::Stage {
            file,
            schema,
            fallback_id,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let json: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let document = UploadDocument::from_json(&json)
                .map_err(|e| anyhow!("Validation problem with your file: {}", e))?;

            let hint = schema.as_deref().or_else(|| document.schema_hint());
            let resolution = registry.resolve(hint);

            let artifact = workflow::stage_upload(
                document.cells(),
                &resolution,
                &registry,
                fallback_id.as_deref(),
                &records,
                &staging,
            )
            .await
            .map_err(|e| match e {
                workflow::WorkflowError::Extract(e) => {
                    anyhow!("Validation problem with your file: {}", e)
                }
                other => anyhow!(other),
            })?;

            println!("Staged artifact: {}", artifact.artifact_id);
            println!("Record:          {}", artifact.record_identifier.as_deref().unwrap_or("(new record candidate)"));
            println!("Schema:          {}", artifact.schema_tag);
            println!("Diff:            {}", artifact.diff.summary());
        }

        Command::List => {
            let summaries = staging.list().await?;
            if summaries.is_empty() {
                println!("No staged artifacts.");
            }
            for summary in summaries {
                println!(
                    "{}  [{}]  record={}  created={}",
                    summary.artifact_id,
                    summary.schema_tag,
                    summary.record_identifier.as_deref().unwrap_or("-"),
                    summary.created_at.to_rfc3339()
                );
            }
        }

        Command::Show { artifact_id } => {
            let artifact = staging.load(&artifact_id).await?;
            println!("Artifact: {}", artifact.artifact_id);
            println!("Record:   {}", artifact.record_identifier.as_deref().unwrap_or("(new record candidate)"));
            println!("Schema:   {}", artifact.schema_tag);
            println!("Created:  {}", artifact.created_at.to_rfc3339());
            println!();
            for change in artifact.diff.iter() {
                println!(
                    "  {:<10} {:<20} {} -> {}",
                    format!("{:?}", change.kind),
                    change.field_name,
                    render(change.prior_value.as_ref()),
                    render(change.new_value.as_ref())
                );
            }
        }

        Command::Decide {
            artifact_id,
            accept,
            reject,
        } => {
            let artifact = staging.load(&artifact_id).await?;
            let decisions = build_decisions(&artifact, &accept, &reject)?;

            for change in artifact.diff.requires_decision() {
                let verdict = match decisions.decision(&change.field_name) {
                    Some(Decision::Accept) => "accept",
                    Some(Decision::Reject) => "reject",
                    None => "undecided",
                };
                println!(
                    "  {:<20} {:<10} {} -> {}",
                    change.field_name,
                    verdict,
                    render(change.prior_value.as_ref()),
                    render(change.new_value.as_ref())
                );
            }
            println!();
            if decisions.is_ready_to_commit() {
                println!("Ready to commit.");
            } else {
                println!("Not ready: undecided fields {}", decisions.undecided().join(", "));
            }
        }

        Command::Commit {
            artifact_id,
            accept,
            reject,
        } => {
            let artifact = staging.load(&artifact_id).await?;
            let mut decisions = build_decisions(&artifact, &accept, &reject)?;

            match commit::commit(&artifact, &mut decisions, &records, &staging).await {
                Ok(outcome) => {
                    println!(
                        "Committed {} field(s) to record {}{}",
                        outcome.written_fields.len(),
                        outcome.record_identifier,
                        if outcome.created_record { " (new record)" } else { "" }
                    );
                }
                Err(CommitError::Conflict { fields }) => {
                    eprintln!("Someone else changed this record while you were reviewing:");
                    for field in &fields {
                        eprintln!(
                            "  {:<20} staged base {} -> live {}",
                            field.field_name,
                            render(field.staged_base.as_ref()),
                            render(field.live.as_ref())
                        );
                    }
                    bail!("Commit refused; discard the artifact and re-stage the upload");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Command::Discard { artifact_id } => {
            let existed = workflow::discard_artifact(&artifact_id, &staging).await?;
            if existed {
                println!("Discarded {}", artifact_id);
            } else {
                println!("Artifact {} was already gone", artifact_id);
            }
        }
    }

    Ok(())
}

/// Reconstruct a decision set from the Accept defaults plus the flags
fn build_decisions(
    artifact: &redline_engine::staging::StagedArtifact,
    accept: &[String],
    reject: &[String],
) -> Result<ReviewDecisionSet> {
    let mut decisions = ReviewDecisionSet::begin_review(artifact);
    for field in accept {
        decisions
            .set_decision(field, Decision::Accept)
            .map_err(|e| anyhow!(e))?;
    }
    for field in reject {
        decisions
            .set_decision(field, Decision::Reject)
            .map_err(|e| anyhow!(e))?;
    }
    Ok(decisions)
}

fn render(value: Option<&FieldValue>) -> String {
    match value {
        None => "(absent)".to_string(),
        Some(v) => match codec::serialize(v) {
            Ok(serde_json::Value::Null) => "null".to_string(),
            Ok(json) => json.to_string(),
            Err(_) => format!("{:?}", v),
        },
    }
}
