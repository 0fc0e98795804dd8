use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use drudge_core::config::QueueConfig;
use drudge_core::handler::QueueHandler;
use drudge_core::{Journal, QueueError};
use drudge_db::TaskStore;

use crate::executor::TaskExecutor;
use crate::lock::WorkerLock;
use crate::scheduler::LeaseScheduler;

/// One worker process for a (queue, slot) pair.
///
/// `run` takes the singleton lock and then polls forever: claim a slice,
/// execute it sequentially, sleep the busy or empty interval depending on
/// whether the claim returned anything. A second runner started for the
/// same slot exits immediately without touching the queue.
pub struct WorkerRunner<S: TaskStore> {
    config: QueueConfig,
    slot: u32,
    scheduler: LeaseScheduler<S>,
    executor: TaskExecutor<S>,
    journal: Box<dyn Journal>,
    lock: WorkerLock,
    tasks_done: u64,
}

impl<S: TaskStore> WorkerRunner<S> {
    pub fn new(
        config: QueueConfig,
        slot: u32,
        store: Arc<S>,
        handler: Arc<dyn QueueHandler>,
        journal: Box<dyn Journal>,
    ) -> Result<Self, QueueError> {
        if !config.lock_dir.is_dir() {
            return Err(QueueError::LockDirMissing(config.lock_dir.clone()));
        }
        let lock = WorkerLock::for_slot(&config.lock_dir, &config.queue, slot);
        Ok(Self {
            scheduler: LeaseScheduler::new(store.clone(), config.clone()),
            executor: TaskExecutor::new(config.clone(), handler, store),
            journal,
            lock,
            config,
            slot,
            tasks_done: 0,
        })
    }

    pub fn tasks_done(&self) -> u64 {
        self.tasks_done
    }

    /// Poll loop. Returns `Ok(())` without looping when another live process
    /// already holds this slot's lock.
    #[tracing::instrument(skip(self), fields(queue = %self.config.queue, slot = self.slot))]
    pub async fn run(&mut self) -> Result<()> {
        if self.lock.held_by_live_process() {
            tracing::info!("Worker already running for this slot, exiting");
            return Ok(());
        }

        // Stagger startup by slot so a fleet booting together does not hit
        // the store in lockstep.
        tokio::time::sleep(Duration::from_secs(self.slot as u64)).await;

        self.lock.write_pid()?;
        tracing::info!(pid = std::process::id(), "Worker started");

        loop {
            let processed = self.run_cycle().await;
            let interval = if processed == 0 {
                self.config.empty_interval_secs
            } else {
                self.config.busy_interval_secs
            };
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    }

    /// One claim-and-execute pass. Executor errors are logged and do not
    /// stop the cycle; the affected task's lease expires on its own.
    pub async fn run_cycle(&mut self) -> usize {
        let tasks = self.scheduler.claim(self.slot).await;
        let mut processed = 0;
        for task in &tasks {
            match self.executor.run(task, self.journal.as_mut()).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    tracing::error!(error = %e, task_id = task.task_id, "Task execution failed");
                }
            }
        }
        self.tasks_done += processed as u64;
        processed
    }
}

/// Signal the worker holding `slot`'s lock to stop and remove its lock file.
/// A slot with no running worker is a no-op.
pub fn stop_worker(config: &QueueConfig, slot: u32) {
    let lock = WorkerLock::for_slot(&config.lock_dir, &config.queue, slot);
    tracing::info!(queue = %config.queue, slot = slot, "Stopping worker");
    lock.kill_holder();
}

pub fn is_worker_running(config: &QueueConfig, slot: u32) -> bool {
    WorkerLock::for_slot(&config.lock_dir, &config.queue, slot).held_by_live_process()
}
