//! Database access for the redline engine
//!
//! One shared SQLite database holds the staged artifacts and the default
//! record store's records. Tables are created on startup.

pub mod records;

use redline_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create engine tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staged_artifacts (
            artifact_id TEXT PRIMARY KEY,
            record_identifier TEXT,
            schema_tag TEXT NOT NULL,
            incoming_payload TEXT NOT NULL,
            base_snapshot TEXT NOT NULL,
            diff TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            record_id TEXT PRIMARY KEY,
            schema_tag TEXT NOT NULL,
            fields TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (staged_artifacts, records)");

    Ok(())
}
