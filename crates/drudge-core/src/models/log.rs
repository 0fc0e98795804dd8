use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Severity of one log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Success,
    Error,
}

impl Display for LogKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LogKind::Info => write!(f, "info"),
            LogKind::Success => write!(f, "success"),
            LogKind::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogKind::Info),
            "success" => Ok(LogKind::Success),
            "error" => Ok(LogKind::Error),
            _ => Err(anyhow::anyhow!("Invalid log kind: {}", s)),
        }
    }
}

/// Whether an entry was written by the worker machinery or by handler code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogOrigin {
    System,
    User,
}

impl Display for LogOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LogOrigin::System => write!(f, "system"),
            LogOrigin::User => write!(f, "user"),
        }
    }
}

/// One structured log line, append-only within a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: i64,
    pub kind: LogKind,
    pub origin: LogOrigin,
    pub text: String,
    pub extra: serde_json::Value,
}

/// The durable unit of log output: the entries accumulated while processing
/// one task, written as a single row and never mutated after flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatch {
    pub id: i64,
    pub created_at: i64,
    pub entries: Vec<LogEntry>,
}
