mod log;
mod task;

pub use log::{LogBatch, LogEntry, LogKind, LogOrigin};
pub use task::Task;
