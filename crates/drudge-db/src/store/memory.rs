//! In-memory store implementations.
//!
//! Same contracts as the Postgres stores, held in a mutex-guarded map. Used
//! by the worker crate's tests and by embedders that want a queue without a
//! database (single process, nothing survives a restart).

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use drudge_core::epoch_now;
use drudge_core::models::{LogBatch, LogEntry, Task};

use crate::store::{LogStore, TaskStore};

#[derive(Default)]
struct TaskState {
    rows: BTreeMap<i64, Task>,
    next_id: i64,
}

/// In-memory counterpart of `PgTaskStore`.
#[derive(Default)]
pub struct MemoryTaskStore {
    state: Mutex<TaskState>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct row lookup, for assertions in tests.
    pub async fn get(&self, task_id: i64) -> Option<Task> {
        self.state.lock().await.rows.get(&task_id).cloned()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn enqueue(
        &self,
        payload: serde_json::Value,
        not_before: Option<i64>,
    ) -> Result<i64> {
        let now = epoch_now();
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let task_id = state.next_id;
        state.rows.insert(
            task_id,
            Task {
                task_id,
                payload,
                attempts: 0,
                created_at: now,
                not_before: not_before.unwrap_or(now),
            },
        );
        Ok(task_id)
    }

    async fn claim_due(
        &self,
        offset: i64,
        limit: i64,
        now: i64,
        lease_until: i64,
    ) -> Result<Vec<Task>> {
        let mut state = self.state.lock().await;
        // BTreeMap iterates in task-id order, matching the SQL ORDER BY.
        let ids: Vec<i64> = state
            .rows
            .values()
            .filter(|t| t.is_due(now))
            .map(|t| t.task_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = state.rows.get_mut(&id) {
                task.attempts += 1;
                task.not_before = lease_until;
                claimed.push(task.clone());
            }
        }
        Ok(claimed)
    }

    async fn delete(&self, task_id: i64) -> Result<()> {
        self.state.lock().await.rows.remove(&task_id);
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state.lock().await.rows.len() as i64)
    }
}

#[derive(Default)]
struct LogState {
    batches: Vec<LogBatch>,
    next_id: i64,
}

/// In-memory counterpart of `PgLogStore`.
#[derive(Default)]
pub struct MemoryLogStore {
    state: Mutex<LogState>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batch_count(&self) -> usize {
        self.state.lock().await.batches.len()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert_batch(&self, created_at: i64, entries: &[LogEntry]) -> Result<i64> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.batches.push(LogBatch {
            id,
            created_at,
            entries: entries.to_vec(),
        });
        Ok(id)
    }

    async fn recent(&self, limit: i64, offset: i64) -> Result<Vec<LogBatch>> {
        let state = self.state.lock().await;
        Ok(state
            .batches
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn delete_older_than(&self, cutoff: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.batches.len();
        state.batches.retain(|b| b.created_at > cutoff);
        Ok((before - state.batches.len()) as u64)
    }
}
