//! Per-queue configuration.
//!
//! Every registered queue carries one immutable [`QueueConfig`], constructed
//! once at startup and passed by reference to the scheduler, executor, and
//! runner. There is no shared mutable global state.

use std::path::PathBuf;

use crate::error::QueueError;

const DEFAULT_WORKER_COUNT: u32 = 1;
const DEFAULT_BUSY_INTERVAL_SECS: u64 = 1;
const DEFAULT_EMPTY_INTERVAL_SECS: u64 = 10;
const DEFAULT_TASK_LIMIT_PER_EXECUTION: i64 = 2;
const DEFAULT_TASK_EXECUTION_TIME_SECS: i64 = 600;
const DEFAULT_LOGS_KEEP_DAYS: i64 = 30;
const DEFAULT_RETRY_COUNT_MAX: i32 = 3;
const DEFAULT_OVERFLOW_ALARM: i64 = 10;

/// Tunable parameters of one queue.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Queue identifier; also the task table name.
    pub queue: String,
    /// Number of parallel worker processes (slots) for this queue.
    pub worker_count: u32,
    /// Sleep between poll cycles when the last claim returned work (seconds).
    pub busy_interval_secs: u64,
    /// Sleep between poll cycles when the queue was empty (seconds).
    pub empty_interval_secs: u64,
    /// When false, tasks are deleted on completion. When true they are kept
    /// and re-run with a period of `task_execution_time_secs`.
    pub persistent: bool,
    /// Rows claimed per poll cycle; also the width of each slot's offset slice.
    pub task_limit_per_execution: i64,
    /// Lease duration: how far `not_before` is pushed into the future on
    /// claim. Must stay comfortably larger than true handler duration.
    pub task_execution_time_secs: i64,
    /// When false, the executor is wired to a discarding journal.
    pub logs_on: bool,
    /// Log table override; defaults to `logs_<queue>`.
    pub logs_table: Option<String>,
    /// Log retention age for the monitor's rotation sweep.
    pub logs_keep_days: i64,
    /// Attempts beyond this count fail permanently without running the handler.
    pub retry_count_max: i32,
    /// When false, the monitor skips the overflow check for this queue.
    pub check_overflow: bool,
    /// Queue depth above which `on_overflow` fires.
    pub overflow_alarm: i64,
    /// Directory holding worker lock files. Must exist before workers start.
    pub lock_dir: PathBuf,
}

impl QueueConfig {
    /// Create a configuration with the defaults for every tunable.
    ///
    /// The queue name doubles as the task table name, so it must be a valid
    /// SQL identifier in the conservative sense checked by
    /// [`is_valid_table_ident`].
    pub fn new(queue: impl Into<String>, lock_dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let queue = queue.into();
        if !is_valid_table_ident(&queue) {
            return Err(QueueError::InvalidQueueName(queue));
        }
        Ok(Self {
            queue,
            worker_count: DEFAULT_WORKER_COUNT,
            busy_interval_secs: DEFAULT_BUSY_INTERVAL_SECS,
            empty_interval_secs: DEFAULT_EMPTY_INTERVAL_SECS,
            persistent: false,
            task_limit_per_execution: DEFAULT_TASK_LIMIT_PER_EXECUTION,
            task_execution_time_secs: DEFAULT_TASK_EXECUTION_TIME_SECS,
            logs_on: true,
            logs_table: None,
            logs_keep_days: DEFAULT_LOGS_KEEP_DAYS,
            retry_count_max: DEFAULT_RETRY_COUNT_MAX,
            check_overflow: true,
            overflow_alarm: DEFAULT_OVERFLOW_ALARM,
            lock_dir: lock_dir.into(),
        })
    }

    /// Task table name.
    pub fn table_name(&self) -> &str {
        &self.queue
    }

    /// Log table name, derived from the queue name unless overridden.
    pub fn logs_table_name(&self) -> String {
        match &self.logs_table {
            Some(name) => name.clone(),
            None => format!("logs_{}", self.queue),
        }
    }

    /// Cutoff timestamp for the log rotation sweep, relative to `now`.
    pub fn logs_cutoff(&self, now: i64) -> i64 {
        now - self.logs_keep_days * 86_400
    }
}

/// Conservative SQL identifier check: lowercase ASCII letters, digits, and
/// underscores, not starting with a digit. Table names are interpolated into
/// SQL strings, so anything else is rejected outright.
pub fn is_valid_table_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
