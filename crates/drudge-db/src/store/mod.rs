//! Store traits and their implementations.
//!
//! The worker crate programs against [`TaskStore`] and [`LogStore`]; the
//! Postgres implementations are the production path, the in-memory ones back
//! tests and lightweight embedding.

use async_trait::async_trait;

use drudge_core::models::{LogBatch, LogEntry, Task};

pub mod log;
pub mod memory;
pub mod task;

pub use log::PgLogStore;
pub use task::PgTaskStore;

/// Durable task rows for one queue.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. `not_before` defaults to now, i.e. runnable
    /// immediately. Returns the new task id.
    async fn enqueue(
        &self,
        payload: serde_json::Value,
        not_before: Option<i64>,
    ) -> anyhow::Result<i64>;

    /// Atomically claim a slice of the due set: select rows with
    /// `not_before <= now` in task-id order at `offset`/`limit`, advance each
    /// one's `not_before` to `lease_until` and increment `attempts`, and
    /// return the updated rows. The select and update commit together, so
    /// another claim that starts after the commit will not see these rows as
    /// due before the lease expires.
    async fn claim_due(
        &self,
        offset: i64,
        limit: i64,
        now: i64,
        lease_until: i64,
    ) -> anyhow::Result<Vec<Task>>;

    /// Remove a task row (completion in non-persistent mode).
    async fn delete(&self, task_id: i64) -> anyhow::Result<()>;

    /// Total row count, due or not.
    async fn count(&self) -> anyhow::Result<i64>;
}

/// Durable log batches for one queue.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one batch row; returns its id.
    async fn insert_batch(&self, created_at: i64, entries: &[LogEntry]) -> anyhow::Result<i64>;

    /// Most recent batches first.
    async fn recent(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<LogBatch>>;

    /// Delete batches with `created_at <= cutoff`; returns how many.
    async fn delete_older_than(&self, cutoff: i64) -> anyhow::Result<u64>;
}

// Stores are shared by value through `Arc` between the scheduler, executor,
// and monitor of one queue.

#[async_trait]
impl<T: TaskStore + ?Sized> TaskStore for std::sync::Arc<T> {
    async fn enqueue(
        &self,
        payload: serde_json::Value,
        not_before: Option<i64>,
    ) -> anyhow::Result<i64> {
        (**self).enqueue(payload, not_before).await
    }

    async fn claim_due(
        &self,
        offset: i64,
        limit: i64,
        now: i64,
        lease_until: i64,
    ) -> anyhow::Result<Vec<Task>> {
        (**self).claim_due(offset, limit, now, lease_until).await
    }

    async fn delete(&self, task_id: i64) -> anyhow::Result<()> {
        (**self).delete(task_id).await
    }

    async fn count(&self) -> anyhow::Result<i64> {
        (**self).count().await
    }
}

#[async_trait]
impl<T: LogStore + ?Sized> LogStore for std::sync::Arc<T> {
    async fn insert_batch(&self, created_at: i64, entries: &[LogEntry]) -> anyhow::Result<i64> {
        (**self).insert_batch(created_at, entries).await
    }

    async fn recent(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<LogBatch>> {
        (**self).recent(limit, offset).await
    }

    async fn delete_older_than(&self, cutoff: i64) -> anyhow::Result<u64> {
        (**self).delete_older_than(cutoff).await
    }
}
