use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use drudge_core::config::is_valid_table_ident;
use drudge_core::models::Task;
use drudge_core::{epoch_now, QueueConfig, QueueError};

use crate::store::TaskStore;

/// Postgres-backed task table for one queue.
///
/// The table name comes from the queue configuration and is validated as a
/// conservative identifier before it is ever interpolated into SQL; all row
/// values travel through bind parameters.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
    table: String,
}

fn task_from_row(row: &PgRow) -> std::result::Result<Task, sqlx::Error> {
    Ok(Task {
        task_id: row.try_get("task_id")?,
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
        created_at: row.try_get("created_at")?,
        not_before: row.try_get("not_before")?,
    })
}

impl PgTaskStore {
    pub fn new(pool: PgPool, config: &QueueConfig) -> Self {
        Self {
            pool,
            table: config.table_name().to_string(),
        }
    }

    /// Build a store for an explicit table name (the log-table sibling uses
    /// the same path). Rejects anything that is not a conservative identifier.
    pub fn for_table(pool: PgPool, table: &str) -> Result<Self, QueueError> {
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

    /// Create the task table when absent. If the table already exists, its
    /// shape is verified; an incompatible shape is fatal and user-visible
    /// (no auto-migration). Returns true when the table was created.
    #[tracing::instrument(skip(self), fields(table = %self.table))]
    pub async fn provision(&self) -> Result<bool> {
        let exists: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check task table existence")?;

        if exists.is_some() {
            // Preparing the statement fails server-side if any column is
            // missing or renamed.
            let probe = format!(
                "SELECT task_id, not_before, attempts, created_at, payload FROM {} LIMIT 1",
                self.table
            );
            sqlx::query(&probe)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, table = %self.table, "Task table structure mismatch");
                    anyhow::Error::new(QueueError::TableMismatch {
                        table: self.table.clone(),
                    })
                })?;
            return Ok(false);
        }

        let ddl = format!(
            r#"
            CREATE TABLE {table} (
                task_id BIGSERIAL PRIMARY KEY,
                not_before BIGINT NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL DEFAULT 0,
                payload JSONB NOT NULL
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .context("Failed to create task table")?;

        let index = format!(
            "CREATE INDEX idx_{table}_not_before ON {table} (not_before)",
            table = self.table
        );
        sqlx::query(&index)
            .execute(&self.pool)
            .await
            .context("Failed to create not_before index")?;

        tracing::info!(table = %self.table, "Task table created");
        Ok(true)
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[tracing::instrument(skip(self, payload), fields(table = %self.table))]
    async fn enqueue(
        &self,
        payload: serde_json::Value,
        not_before: Option<i64>,
    ) -> Result<i64> {
        let now = epoch_now();
        let not_before = not_before.unwrap_or(now);

        let sql = format!(
            "INSERT INTO {} (not_before, attempts, created_at, payload) \
             VALUES ($1, 0, $2, $3) RETURNING task_id",
            self.table
        );
        let task_id: i64 = sqlx::query_scalar(&sql)
            .bind(not_before)
            .bind(now)
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert task")?;

        tracing::debug!(task_id = task_id, not_before = not_before, "Task enqueued");
        Ok(task_id)
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn claim_due(
        &self,
        offset: i64,
        limit: i64,
        now: i64,
        lease_until: i64,
    ) -> Result<Vec<Task>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin claim transaction")?;

        let select = format!(
            "SELECT task_id FROM {} WHERE not_before <= $1 \
             ORDER BY task_id LIMIT $2 OFFSET $3 FOR UPDATE",
            self.table
        );
        let ids: Vec<i64> = sqlx::query_scalar(&select)
            .bind(now)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to select due tasks")?;

        if ids.is_empty() {
            tx.rollback().await.ok();
            return Ok(Vec::new());
        }

        // The update commits with the select, so the claimed rows leave the
        // due set in the same atomic step that hands them to this worker.
        let update = format!(
            "UPDATE {} SET not_before = $1, attempts = attempts + 1 \
             WHERE task_id = ANY($2) \
             RETURNING task_id, not_before, attempts, created_at, payload",
            self.table
        );
        let mut tasks: Vec<Task> = sqlx::query(&update)
            .bind(lease_until)
            .bind(&ids)
            .try_map(|row| task_from_row(&row))
            .fetch_all(&mut *tx)
            .await
            .context("Failed to lease claimed tasks")?;

        tx.commit().await.context("Failed to commit claim")?;

        tasks.sort_by_key(|t| t.task_id);
        tracing::debug!(claimed = tasks.len(), offset = offset, "Tasks claimed");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self), fields(table = %self.table))]
    async fn delete(&self, task_id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE task_id = $1", self.table);
        sqlx::query(&sql)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete task")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count tasks")?;
        Ok(count)
    }
}
