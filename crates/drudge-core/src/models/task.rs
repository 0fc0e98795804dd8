use serde::{Deserialize, Serialize};

/// One row of a queue's task table.
///
/// `not_before` is the earliest time (epoch seconds) the task may be claimed;
/// each claim pushes it forward by the queue's execution-time budget and
/// increments `attempts`, so a freshly claimed task already carries the
/// attempt number of the execution about to happen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: i64,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub created_at: i64,
    pub not_before: i64,
}

impl Task {
    /// Whether the task is eligible for claiming at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.not_before <= now
    }

    /// Whether the retry budget is spent. A task whose claim-incremented
    /// attempt count exceeds the limit fails permanently without the handler
    /// being invoked.
    pub fn exhausted(&self, retry_count_max: i32) -> bool {
        self.attempts > retry_count_max
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn payload_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
