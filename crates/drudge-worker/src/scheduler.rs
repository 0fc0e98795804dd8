use std::sync::Arc;

use drudge_core::config::QueueConfig;
use drudge_core::epoch_now;
use drudge_core::models::Task;
use drudge_db::TaskStore;

/// Claims each worker slot's slice of the due set.
///
/// Slot `n` reads at offset `n * task_limit_per_execution`, so concurrent
/// workers on the same queue claim disjoint slices without talking to each
/// other. Every claimed task's `not_before` is pushed forward by the lease
/// window; a worker that dies mid-task releases nothing, the lease just
/// expires and another claim picks the task up.
pub struct LeaseScheduler<S: TaskStore> {
    store: Arc<S>,
    config: QueueConfig,
}

impl<S: TaskStore> LeaseScheduler<S> {
    pub fn new(store: Arc<S>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Claim up to `task_limit_per_execution` due tasks for `slot`.
    ///
    /// Store failures degrade to an empty claim: the worker loop treats it
    /// as an idle cycle and retries on its next poll.
    #[tracing::instrument(skip(self), fields(queue = %self.config.queue))]
    pub async fn claim(&self, slot: u32) -> Vec<Task> {
        let limit = self.config.task_limit_per_execution;
        let offset = slot as i64 * limit;
        let now = epoch_now();
        let lease_until = now + self.config.task_execution_time_secs;

        match self.store.claim_due(offset, limit, now, lease_until).await {
            Ok(tasks) => {
                if !tasks.is_empty() {
                    tracing::debug!(claimed = tasks.len(), slot = slot, "Tasks claimed");
                }
                tasks
            }
            Err(e) => {
                tracing::warn!(error = %e, slot = slot, "Claim failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Total queue depth, due or leased. Degrades to 0 on store failure.
    pub async fn queue_size(&self) -> i64 {
        match self.store.count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, queue = %self.config.queue, "Count failed, reporting empty");
                0
            }
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}
