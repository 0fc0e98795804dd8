use std::sync::Arc;

use anyhow::Result;

use drudge_core::config::QueueConfig;
use drudge_core::epoch_now;
use drudge_core::handler::QueueHandler;
use drudge_db::{LogStore, TaskStore};

use crate::scheduler::LeaseScheduler;

/// Out-of-band housekeeping for one queue: the overflow alarm and the log
/// retention sweep. Runs on its own schedule (typically cron), never inside
/// the worker loop.
pub struct QueueMonitor<S: TaskStore, L: LogStore> {
    config: QueueConfig,
    handler: Arc<dyn QueueHandler>,
    scheduler: LeaseScheduler<S>,
    log_store: L,
}

impl<S: TaskStore, L: LogStore> QueueMonitor<S, L> {
    pub fn new(
        config: QueueConfig,
        handler: Arc<dyn QueueHandler>,
        store: Arc<S>,
        log_store: L,
    ) -> Self {
        Self {
            scheduler: LeaseScheduler::new(store, config.clone()),
            handler,
            log_store,
            config,
        }
    }

    /// Fire `on_overflow` when queue depth exceeds the alarm threshold.
    /// Returns whether the alarm fired. Depth exactly at the threshold does
    /// not fire.
    #[tracing::instrument(skip(self), fields(queue = %self.config.queue))]
    pub async fn check_overflow(&self) -> bool {
        if !self.config.check_overflow {
            return false;
        }
        let size = self.scheduler.queue_size().await;
        if size > self.config.overflow_alarm {
            tracing::warn!(
                size = size,
                alarm = self.config.overflow_alarm,
                "Queue overflow"
            );
            self.handler.on_overflow().await;
            return true;
        }
        false
    }

    /// Delete log batches older than the retention window. Queues with
    /// logging off have nothing to rotate.
    #[tracing::instrument(skip(self), fields(queue = %self.config.queue))]
    pub async fn rotate_logs(&self) -> Result<u64> {
        if !self.config.logs_on {
            return Ok(0);
        }
        let cutoff = self.config.logs_cutoff(epoch_now());
        self.log_store.delete_older_than(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use drudge_core::models::{LogEntry, LogKind, LogOrigin};
    use drudge_core::Journal;
    use drudge_db::{MemoryLogStore, MemoryTaskStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct OverflowProbe {
        fired: AtomicU32,
    }

    #[async_trait]
    impl QueueHandler for OverflowProbe {
        async fn work(
            &self,
            _payload: &serde_json::Value,
            _journal: &mut dyn Journal,
        ) -> Result<bool> {
            Ok(true)
        }
        async fn on_overflow(&self) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> QueueConfig {
        let mut c = QueueConfig::new("mail", std::env::temp_dir()).unwrap();
        c.overflow_alarm = 10;
        c
    }

    async fn filled_store(n: usize) -> Arc<MemoryTaskStore> {
        let store = Arc::new(MemoryTaskStore::new());
        for i in 0..n {
            store.enqueue(json!({ "n": i }), Some(0)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn alarm_fires_only_above_threshold() {
        let handler = Arc::new(OverflowProbe::default());

        let at_threshold = QueueMonitor::new(
            config(),
            handler.clone(),
            filled_store(10).await,
            MemoryLogStore::new(),
        );
        assert!(!at_threshold.check_overflow().await);
        assert_eq!(handler.fired.load(Ordering::SeqCst), 0);

        let over_threshold = QueueMonitor::new(
            config(),
            handler.clone(),
            filled_store(11).await,
            MemoryLogStore::new(),
        );
        assert!(over_threshold.check_overflow().await);
        assert_eq!(handler.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_check_never_fires() {
        let handler = Arc::new(OverflowProbe::default());
        let mut config = config();
        config.check_overflow = false;

        let monitor = QueueMonitor::new(
            config,
            handler.clone(),
            filled_store(50).await,
            MemoryLogStore::new(),
        );
        assert!(!monitor.check_overflow().await);
        assert_eq!(handler.fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rotation_prunes_expired_batches() {
        let logs = Arc::new(MemoryLogStore::new());
        let entry = LogEntry {
            timestamp: 0,
            kind: LogKind::Info,
            origin: LogOrigin::System,
            text: "old".into(),
            extra: json!({}),
        };
        // Well past any retention window.
        logs.insert_batch(1, std::slice::from_ref(&entry)).await.unwrap();
        logs.insert_batch(epoch_now(), &[entry]).await.unwrap();

        let monitor = QueueMonitor::new(
            config(),
            Arc::new(OverflowProbe::default()),
            filled_store(0).await,
            logs.clone(),
        );
        assert_eq!(monitor.rotate_logs().await.unwrap(), 1);
        assert_eq!(logs.batch_count().await, 1);
    }

    #[tokio::test]
    async fn rotation_is_a_no_op_with_logging_off() {
        let logs = Arc::new(MemoryLogStore::new());
        logs.insert_batch(1, &[]).await.unwrap();

        let mut config = config();
        config.logs_on = false;
        let monitor = QueueMonitor::new(
            config,
            Arc::new(OverflowProbe::default()),
            filled_store(0).await,
            logs.clone(),
        );

        assert_eq!(monitor.rotate_logs().await.unwrap(), 0);
        assert_eq!(logs.batch_count().await, 1);
    }
}
