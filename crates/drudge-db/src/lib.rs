//! Storage layer for the drudge background task queue.
//!
//! One generic row shape per concern (tasks, log batches), parameterized only
//! by table name: each registered queue gets its own pair of tables chosen
//! at configuration time, never a generated schema.

pub mod store;

pub use store::memory::{MemoryLogStore, MemoryTaskStore};
pub use store::{LogStore, PgLogStore, PgTaskStore, TaskStore};
