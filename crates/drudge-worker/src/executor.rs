use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use drudge_core::config::QueueConfig;
use drudge_core::handler::QueueHandler;
use drudge_core::models::Task;
use drudge_core::Journal;
use drudge_db::TaskStore;

/// What became of one claimed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Handler succeeded; the task is done (and deleted unless the queue is
    /// persistent).
    Completed,
    /// Handler failed or faulted; the row stays and reappears when its lease
    /// expires.
    Retried,
    /// The retry budget was already spent; the task is dropped without
    /// running the handler.
    Exhausted,
}

/// Runs one claimed task through the handler and settles the row.
///
/// Exactly one journal batch is flushed per `run`, whatever the outcome, so
/// the log table reads as one row per processing attempt.
pub struct TaskExecutor<S: TaskStore> {
    config: QueueConfig,
    handler: Arc<dyn QueueHandler>,
    store: Arc<S>,
}

impl<S: TaskStore> TaskExecutor<S> {
    pub fn new(config: QueueConfig, handler: Arc<dyn QueueHandler>, store: Arc<S>) -> Self {
        Self {
            config,
            handler,
            store,
        }
    }

    #[tracing::instrument(skip(self, task, journal), fields(queue = %self.config.queue, task_id = task.task_id))]
    pub async fn run(&self, task: &Task, journal: &mut dyn Journal) -> Result<TaskOutcome> {
        let outcome = self.execute(task, journal).await;
        journal.save().await?;
        outcome
    }

    async fn execute(&self, task: &Task, journal: &mut dyn Journal) -> Result<TaskOutcome> {
        journal.info(
            "Processing task",
            json!({ "task_id": task.task_id, "payload": task.payload }),
        );

        // `attempts` was already incremented by the claim, so a task claimed
        // for the (max + 1)-th time arrives here with attempts == max + 1.
        if task.exhausted(self.config.retry_count_max) {
            journal.error(
                &format!(
                    "Tried and failed {} times, giving up",
                    task.attempts.saturating_sub(1)
                ),
                json!({ "task_id": task.task_id }),
            );
            self.handler.on_fail().await;
            self.settle(task, journal).await?;
            return Ok(TaskOutcome::Exhausted);
        }

        match self.handler.work(&task.payload, journal).await {
            Ok(true) => {
                journal.success("Task completed", json!({ "task_id": task.task_id }));
                self.handler.on_ok().await;
                self.settle(task, journal).await?;
                Ok(TaskOutcome::Completed)
            }
            Ok(false) => {
                journal.error(
                    "Handler reported failure, task will be retried",
                    json!({ "task_id": task.task_id, "attempts": task.attempts }),
                );
                self.handler.on_retry().await;
                Ok(TaskOutcome::Retried)
            }
            Err(e) => {
                tracing::warn!(error = %e, task_id = task.task_id, "Handler faulted");
                journal.error(
                    &format!("Handler faulted: {:#}", e),
                    json!({ "task_id": task.task_id, "attempts": task.attempts }),
                );
                self.handler.on_retry().await;
                Ok(TaskOutcome::Retried)
            }
        }
    }

    /// Remove the row once processing is over, unless the queue keeps rows
    /// around for inspection.
    async fn settle(&self, task: &Task, journal: &mut dyn Journal) -> Result<()> {
        if self.config.persistent {
            return Ok(());
        }
        journal.info(
            "Deleting the task from the queue",
            json!({ "task_id": task.task_id }),
        );
        self.store
            .delete(task.task_id)
            .await
            .context("Failed to delete settled task")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use drudge_core::models::{LogKind, LogOrigin};
    use drudge_db::MemoryTaskStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        SoftFail,
        Fault,
    }

    struct CountingHandler {
        behavior: Behavior,
        ok: AtomicU32,
        fail: AtomicU32,
        retry: AtomicU32,
    }

    impl CountingHandler {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                ok: AtomicU32::new(0),
                fail: AtomicU32::new(0),
                retry: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl QueueHandler for CountingHandler {
        async fn work(
            &self,
            _payload: &serde_json::Value,
            journal: &mut dyn Journal,
        ) -> Result<bool> {
            journal.user_info("handler ran", json!({}));
            match self.behavior {
                Behavior::Succeed => Ok(true),
                Behavior::SoftFail => Ok(false),
                Behavior::Fault => Err(anyhow::anyhow!("boom")),
            }
        }
        async fn on_ok(&self) {
            self.ok.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_fail(&self) {
            self.fail.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_retry(&self) {
            self.retry.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Buffers entries and counts flushes, without a backing store.
    #[derive(Default)]
    struct ProbeJournal {
        entries: Vec<(LogKind, String)>,
        saves: u32,
    }

    #[async_trait]
    impl Journal for ProbeJournal {
        fn record(
            &mut self,
            kind: LogKind,
            _origin: LogOrigin,
            text: &str,
            _extra: serde_json::Value,
        ) {
            self.entries.push((kind, text.to_string()));
        }
        async fn save(&mut self) -> Result<()> {
            self.saves += 1;
            Ok(())
        }
    }

    fn config(persistent: bool) -> QueueConfig {
        let mut c = QueueConfig::new("mail", std::env::temp_dir()).unwrap();
        c.persistent = persistent;
        c.retry_count_max = 3;
        c
    }

    async fn claimed_task(store: &Arc<MemoryTaskStore>) -> Task {
        store.enqueue(json!({"n": 1}), Some(0)).await.unwrap();
        store.claim_due(0, 1, 0, 600).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn success_deletes_task_and_fires_on_ok() {
        let store = Arc::new(MemoryTaskStore::new());
        let handler = CountingHandler::new(Behavior::Succeed);
        let executor = TaskExecutor::new(config(false), handler.clone(), store.clone());
        let task = claimed_task(&store).await;

        let mut journal = ProbeJournal::default();
        let outcome = executor.run(&task, &mut journal).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(handler.ok.load(Ordering::SeqCst), 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(journal.saves, 1);
        assert!(journal
            .entries
            .iter()
            .any(|(k, _)| *k == LogKind::Success));
    }

    #[tokio::test]
    async fn persistent_queue_keeps_completed_rows() {
        let store = Arc::new(MemoryTaskStore::new());
        let handler = CountingHandler::new(Behavior::Succeed);
        let executor = TaskExecutor::new(config(true), handler, store.clone());
        let task = claimed_task(&store).await;

        executor.run(&task, &mut ProbeJournal::default()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn soft_failure_keeps_row_and_fires_on_retry() {
        let store = Arc::new(MemoryTaskStore::new());
        let handler = CountingHandler::new(Behavior::SoftFail);
        let executor = TaskExecutor::new(config(false), handler.clone(), store.clone());
        let task = claimed_task(&store).await;

        let outcome = executor
            .run(&task, &mut ProbeJournal::default())
            .await
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Retried);
        assert_eq!(handler.retry.load(Ordering::SeqCst), 1);
        assert_eq!(handler.ok.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fault_records_error_chain_and_retries() {
        let store = Arc::new(MemoryTaskStore::new());
        let handler = CountingHandler::new(Behavior::Fault);
        let executor = TaskExecutor::new(config(false), handler.clone(), store.clone());
        let task = claimed_task(&store).await;

        let mut journal = ProbeJournal::default();
        let outcome = executor.run(&task, &mut journal).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Retried);
        assert_eq!(handler.retry.load(Ordering::SeqCst), 1);
        assert!(journal
            .entries
            .iter()
            .any(|(k, t)| *k == LogKind::Error && t.contains("boom")));
    }

    #[tokio::test]
    async fn exhausted_task_skips_handler_and_fires_on_fail() {
        let store = Arc::new(MemoryTaskStore::new());
        let handler = CountingHandler::new(Behavior::Succeed);
        let executor = TaskExecutor::new(config(false), handler.clone(), store.clone());

        let mut task = claimed_task(&store).await;
        task.attempts = 4; // past a retry_count_max of 3

        let mut journal = ProbeJournal::default();
        let outcome = executor.run(&task, &mut journal).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Exhausted);
        assert_eq!(handler.fail.load(Ordering::SeqCst), 1);
        assert_eq!(handler.ok.load(Ordering::SeqCst), 0);
        // Handler never ran, so no user-origin entry.
        assert!(!journal.entries.iter().any(|(_, t)| t == "handler ran"));
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(journal
            .entries
            .iter()
            .any(|(_, t)| t.contains("Tried and failed 3 times")));
    }

    #[tokio::test]
    async fn one_flush_even_when_settle_fails() {
        struct NoDelete(MemoryTaskStore);
        #[async_trait]
        impl TaskStore for NoDelete {
            async fn enqueue(
                &self,
                payload: serde_json::Value,
                not_before: Option<i64>,
            ) -> Result<i64> {
                self.0.enqueue(payload, not_before).await
            }
            async fn claim_due(&self, o: i64, l: i64, n: i64, u: i64) -> Result<Vec<Task>> {
                self.0.claim_due(o, l, n, u).await
            }
            async fn delete(&self, _task_id: i64) -> Result<()> {
                Err(anyhow::anyhow!("delete refused"))
            }
            async fn count(&self) -> Result<i64> {
                self.0.count().await
            }
        }

        let store = Arc::new(NoDelete(MemoryTaskStore::default()));
        let handler = CountingHandler::new(Behavior::Succeed);
        let executor = TaskExecutor::new(config(false), handler, store.clone());
        store.enqueue(json!({}), Some(0)).await.unwrap();
        let task = store.claim_due(0, 1, 0, 600).await.unwrap().remove(0);

        let mut journal = ProbeJournal::default();
        let result = executor.run(&task, &mut journal).await;

        assert!(result.is_err());
        assert_eq!(journal.saves, 1);
    }
}
