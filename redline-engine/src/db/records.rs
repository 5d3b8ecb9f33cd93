//! SQLite-backed record store
//!
//! Default `RecordStore` integration: one row per record with a JSON field
//! map. Writes are read-merge-write inside a single transaction, which also
//! satisfies the committer's critical-section contract on SQLite (one
//! writer at a time).

use async_trait::async_trait;
use redline_common::fields::{FieldEntry, FieldValue, RecordPayload};
use redline_common::{time, Error, Result};
use sqlx::SqlitePool;

use crate::commit::RecordStore;

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_fields(
    record_identifier: &str,
    schema_tag: &str,
    fields_json: &str,
) -> Result<RecordPayload> {
    let entries: Vec<FieldEntry> = serde_json::from_str(fields_json).map_err(|e| {
        Error::Internal(format!(
            "Corrupt record '{}' field map: {}",
            record_identifier, e
        ))
    })?;
    let mut payload = RecordPayload::new(schema_tag, Some(record_identifier.to_string()));
    for entry in entries {
        payload.set(&entry.name, entry.value);
    }
    Ok(payload)
}

fn render_fields(payload: &RecordPayload) -> Result<String> {
    let entries: Vec<FieldEntry> = payload
        .iter()
        .map(|(name, value)| FieldEntry {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect();
    serde_json::to_string(&entries)
        .map_err(|e| Error::Internal(format!("Failed to serialize field map: {}", e)))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn read(&self, record_identifier: &str) -> Result<RecordPayload> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT schema_tag, fields FROM records WHERE record_id = ?")
                .bind(record_identifier)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((schema_tag, fields)) => parse_fields(record_identifier, &schema_tag, &fields),
            // A record that does not exist yet reads as an empty payload
            None => Ok(RecordPayload::empty("")),
        }
    }

    async fn write(
        &self,
        record_identifier: &str,
        schema_tag: &str,
        write_set: &[(String, FieldValue)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String, String)> =
            sqlx::query_as("SELECT schema_tag, fields FROM records WHERE record_id = ?")
                .bind(record_identifier)
                .fetch_optional(&mut *tx)
                .await?;

        let mut payload = match existing {
            Some((tag, fields)) => parse_fields(record_identifier, &tag, &fields)?,
            None => RecordPayload::new(schema_tag, Some(record_identifier.to_string())),
        };
        for (name, value) in write_set {
            payload.set(name, value.clone());
        }

        let fields_json = render_fields(&payload)?;
        let updated_at = time::format_utc_micros(time::now());

        sqlx::query(
            r#"
            INSERT INTO records (record_id, schema_tag, fields, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                schema_tag = excluded.schema_tag,
                fields = excluded.fields,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record_identifier)
        .bind(schema_tag)
        .bind(&fields_json)
        .bind(&updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
