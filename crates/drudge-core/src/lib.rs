//! Core types for the drudge background task queue.
//!
//! This crate holds everything the storage and worker layers share: the task
//! and log record types, the immutable per-queue configuration, the
//! [`QueueHandler`] trait implemented by user code, and the [`Journal`]
//! logging seam. It has no database dependency.

pub mod config;
pub mod error;
pub mod handler;
pub mod journal;
pub mod models;
pub mod text;

pub use config::QueueConfig;
pub use error::QueueError;
pub use handler::QueueHandler;
pub use journal::Journal;
pub use models::{LogBatch, LogEntry, LogKind, LogOrigin, Task};

/// Current epoch time in whole seconds, as stored in task and log rows.
pub fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}
