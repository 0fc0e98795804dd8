//! Error types for queue construction and provisioning.
//!
//! Operational paths (claiming, executing, flushing logs) use `anyhow` and
//! degrade per the worker's propagation policy; the variants here are the
//! fatal, user-visible conditions that require manual intervention.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid queue name {0:?}: must be lowercase alphanumeric or underscore, not starting with a digit")]
    InvalidQueueName(String),

    #[error("lock file directory does not exist: {0}")]
    LockDirMissing(PathBuf),

    #[error("queue {0:?} is already registered")]
    DuplicateQueue(String),

    /// The table exists but its columns do not match the expected shape.
    /// There is no auto-migration; drop the table and provision again.
    #[error("table {table:?} exists with an incompatible structure; delete it and run provision again")]
    TableMismatch { table: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = QueueError::InvalidQueueName("bad-name".into());
        assert!(err.to_string().contains("bad-name"));

        let err = QueueError::TableMismatch {
            table: "queue_mail".into(),
        };
        assert!(err.to_string().contains("queue_mail"));

        let err = QueueError::LockDirMissing(PathBuf::from("/var/lock/drudge"));
        assert!(err.to_string().contains("/var/lock/drudge"));
    }
}
