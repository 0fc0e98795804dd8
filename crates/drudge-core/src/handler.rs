//! The user-facing contract: one handler type per queue.

use async_trait::async_trait;

use crate::journal::Journal;

/// Implemented by application code, one type per queue.
///
/// `work` receives the payload stored at enqueue time. Return `Ok(true)` to
/// mark the task successful, `Ok(false)` to mark it failed and have it
/// retried up to `retry_count_max` times. An `Err` is caught by the executor,
/// logged with its full chain, and treated the same as `Ok(false)`; it never
/// aborts the worker loop.
///
/// The hook methods are pure side-effect points (metrics, alerts); the
/// executor consumes no return value from them.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn work(
        &self,
        payload: &serde_json::Value,
        journal: &mut dyn Journal,
    ) -> anyhow::Result<bool>;

    /// Called after a successful completion.
    async fn on_ok(&self) {}

    /// Called when a task permanently fails (retries exhausted).
    async fn on_fail(&self) {}

    /// Called when a failed attempt is left for retry.
    async fn on_retry(&self) {}

    /// Called by the monitor when the queue depth exceeds `overflow_alarm`.
    async fn on_overflow(&self) {}
}
