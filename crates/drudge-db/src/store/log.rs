use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use drudge_core::config::is_valid_table_ident;
use drudge_core::models::{LogBatch, LogEntry};
use drudge_core::QueueError;

use crate::store::LogStore;

/// Postgres-backed log batches for one queue. One row per flush; entries are
/// stored as a JSONB array and never mutated after insert.
#[derive(Clone)]
pub struct PgLogStore {
    pool: PgPool,
    table: String,
}

fn batch_from_row(row: &PgRow) -> std::result::Result<LogBatch, sqlx::Error> {
    let entries_json: serde_json::Value = row.try_get("entries")?;
    let entries: Vec<LogEntry> = serde_json::from_value(entries_json)
        .map_err(|e| sqlx::Error::Decode(format!("Failed to decode log entries: {}", e).into()))?;
    Ok(LogBatch {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        entries,
    })
}

impl PgLogStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self, QueueError> {
        if !is_valid_table_ident(table) {
            return Err(QueueError::InvalidQueueName(table.to_string()));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the log table when absent; verify shape when present.
    /// Incompatible shape is fatal, as for the task table.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn provision(&self) -> Result<bool> {
        let exists: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check log table existence")?;

        if exists.is_some() {
            let probe = format!(
                "SELECT id, created_at, entries FROM {} LIMIT 1",
                self.table
            );
            sqlx::query(&probe)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, table = %self.table, "Log table structure mismatch");
                    anyhow::Error::new(QueueError::TableMismatch {
                        table: self.table.clone(),
                    })
                })?;
            return Ok(false);
        }

        let ddl = format!(
            r#"
            CREATE TABLE {table} (
                id BIGSERIAL PRIMARY KEY,
                created_at BIGINT NOT NULL DEFAULT 0,
                entries JSONB NOT NULL
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .context("Failed to create log table")?;

        let index = format!(
            "CREATE INDEX idx_{table}_created_at ON {table} (created_at)",
            table = self.table
        );
        sqlx::query(&index)
            .execute(&self.pool)
            .await
            .context("Failed to create created_at index")?;

        tracing::info!(table = %self.table, "Log table created");
        Ok(true)
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    #[tracing::instrument(skip(self, entries), fields(table = %self.table, entries = entries.len()))]
    async fn insert_batch(&self, created_at: i64, entries: &[LogEntry]) -> Result<i64> {
        let entries_json =
            serde_json::to_value(entries).context("Failed to serialize log entries")?;

        let sql = format!(
            "INSERT INTO {} (created_at, entries) VALUES ($1, $2) RETURNING id",
            self.table
        );
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(created_at)
            .bind(entries_json)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert log batch")?;

        Ok(id)
    }

    async fn recent(&self, limit: i64, offset: i64) -> Result<Vec<LogBatch>> {
        let sql = format!(
            "SELECT id, created_at, entries FROM {} ORDER BY id DESC LIMIT $1 OFFSET $2",
            self.table
        );
        let batches = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .try_map(|row| batch_from_row(&row))
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch recent log batches")?;
        Ok(batches)
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn delete_older_than(&self, cutoff: i64) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE created_at <= $1", self.table);
        let result = sqlx::query(&sql)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to delete old log batches")?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted = deleted, cutoff = cutoff, "Old log batches deleted");
        }
        Ok(deleted)
    }
}
