//! Journal implementations: the buffering journal and its no-op twin.

use anyhow::{Context, Result};
use async_trait::async_trait;

use drudge_core::models::{LogBatch, LogEntry, LogKind, LogOrigin};
use drudge_core::text::sanitize;
use drudge_core::{epoch_now, Journal};
use drudge_db::LogStore;

/// Accumulates entries in memory for the lifetime of one task's processing
/// and flushes them as a single batch row on `save`.
pub struct LogJournal<S: LogStore> {
    store: S,
    buffer: Vec<LogEntry>,
}

impl<S: LogStore> LogJournal<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            buffer: Vec::new(),
        }
    }

    /// Entries buffered since the last flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read back persisted batches, most recent first.
    pub async fn recent(&self, limit: i64, offset: i64) -> Result<Vec<LogBatch>> {
        self.store.recent(limit, offset).await
    }

    /// Prune persisted batches with `created_at <= cutoff`.
    pub async fn delete_older_than(&self, cutoff: i64) -> Result<u64> {
        self.store.delete_older_than(cutoff).await
    }
}

#[async_trait]
impl<S: LogStore> Journal for LogJournal<S> {
    fn record(&mut self, kind: LogKind, origin: LogOrigin, text: &str, extra: serde_json::Value) {
        self.buffer.push(LogEntry {
            timestamp: epoch_now(),
            kind,
            origin,
            text: sanitize(text),
            extra,
        });
    }

    async fn save(&mut self) -> Result<()> {
        let entries = std::mem::take(&mut self.buffer);
        // An empty buffer still produces a batch row; a flushed batch marks
        // one completed processing attempt either way.
        self.store
            .insert_batch(epoch_now(), &entries)
            .await
            .context("Failed to flush log batch")?;
        Ok(())
    }
}

/// Selected once at configuration time when a queue has `logs_on = false`.
/// Every call succeeds trivially and discards data, so the executor carries
/// no branch on whether logging is enabled.
pub struct NullJournal;

#[async_trait]
impl Journal for NullJournal {
    fn record(&mut self, _kind: LogKind, _origin: LogOrigin, _text: &str, _extra: serde_json::Value) {}

    async fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drudge_db::MemoryLogStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn save_persists_entries_in_call_order() {
        let store = Arc::new(MemoryLogStore::new());
        let mut journal = LogJournal::new(store.clone());

        journal.info("first", json!({}));
        journal.error("second", json!({"code": 7}));
        journal.success("third", json!({}));
        assert_eq!(journal.buffered(), 3);

        journal.save().await.unwrap();
        assert_eq!(journal.buffered(), 0);

        let batches = store.recent(10, 0).await.unwrap();
        assert_eq!(batches.len(), 1);
        let texts: Vec<&str> = batches[0].entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(batches[0].entries[1].kind, LogKind::Error);
        assert_eq!(batches[0].entries[1].extra, json!({"code": 7}));
    }

    #[tokio::test]
    async fn empty_save_persists_an_empty_batch() {
        let store = Arc::new(MemoryLogStore::new());
        let mut journal = LogJournal::new(store.clone());

        journal.save().await.unwrap();

        let batches = store.recent(10, 0).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].entries.is_empty());
    }

    #[tokio::test]
    async fn user_entries_carry_user_origin() {
        let store = Arc::new(MemoryLogStore::new());
        let mut journal = LogJournal::new(store.clone());

        journal.user_info("from handler", json!({}));
        journal.info("from worker", json!({}));
        journal.save().await.unwrap();

        let batches = store.recent(1, 0).await.unwrap();
        assert_eq!(batches[0].entries[0].origin, LogOrigin::User);
        assert_eq!(batches[0].entries[1].origin, LogOrigin::System);
    }

    #[tokio::test]
    async fn text_is_sanitized_before_buffering() {
        let store = Arc::new(MemoryLogStore::new());
        let mut journal = LogJournal::new(store.clone());

        journal.error("  padded \0text  ", json!({}));
        journal.save().await.unwrap();

        let batches = store.recent(1, 0).await.unwrap();
        assert_eq!(batches[0].entries[0].text, "padded text");
    }

    #[tokio::test]
    async fn null_journal_discards_everything() {
        let mut journal = NullJournal;
        journal.info("dropped", json!({}));
        journal.user_error("also dropped", json!({}));
        journal.save().await.unwrap();
    }

    #[tokio::test]
    async fn each_save_is_its_own_batch() {
        let store = Arc::new(MemoryLogStore::new());
        let mut journal = LogJournal::new(store.clone());

        journal.info("a", json!({}));
        journal.save().await.unwrap();
        journal.info("b", json!({}));
        journal.save().await.unwrap();

        assert_eq!(store.batch_count().await, 2);
    }
}
