//! The logging seam between the executor, handler code, and the log store.
//!
//! The worker crate provides two implementations: a buffering journal that
//! flushes one batch per task execution, and a discarding one selected when a
//! queue has logging turned off. Callers never branch on whether logging is
//! active; they hold a `&mut dyn Journal` either way.

use async_trait::async_trait;

use crate::models::{LogKind, LogOrigin};

#[async_trait]
pub trait Journal: Send {
    /// Append one entry to the in-memory batch.
    fn record(&mut self, kind: LogKind, origin: LogOrigin, text: &str, extra: serde_json::Value);

    /// Flush the buffered entries as a single durable batch and clear the
    /// buffer. An empty buffer still produces an (empty) batch.
    async fn save(&mut self) -> anyhow::Result<()>;

    fn info(&mut self, text: &str, extra: serde_json::Value) {
        self.record(LogKind::Info, LogOrigin::System, text, extra);
    }

    fn success(&mut self, text: &str, extra: serde_json::Value) {
        self.record(LogKind::Success, LogOrigin::System, text, extra);
    }

    fn error(&mut self, text: &str, extra: serde_json::Value) {
        self.record(LogKind::Error, LogOrigin::System, text, extra);
    }

    /// User-origin entries, for handler code reporting its own progress.
    fn user_info(&mut self, text: &str, extra: serde_json::Value) {
        self.record(LogKind::Info, LogOrigin::User, text, extra);
    }

    fn user_error(&mut self, text: &str, extra: serde_json::Value) {
        self.record(LogKind::Error, LogOrigin::User, text, extra);
    }
}
