//! Worker side of the drudge background task queue.
//!
//! One OS process per (queue, slot) runs a [`WorkerRunner`]: it takes the
//! singleton lock for its slot, then loops claiming due tasks through the
//! [`LeaseScheduler`] and handing them to the [`TaskExecutor`] one at a time.
//! There is no in-process concurrency; all coordination between workers goes
//! through the store's atomic claim and the lock files.
//!
//! The [`QueueMonitor`] runs out-of-band on its own schedule for the overflow
//! check and the log retention sweep.

pub mod executor;
pub mod journal;
pub mod lock;
pub mod monitor;
pub mod registry;
pub mod runner;
pub mod scheduler;

pub use executor::{TaskExecutor, TaskOutcome};
pub use journal::{LogJournal, NullJournal};
pub use lock::WorkerLock;
pub use monitor::QueueMonitor;
pub use registry::{QueueRegistry, Registration};
pub use runner::{is_worker_running, stop_worker, WorkerRunner};
pub use scheduler::LeaseScheduler;
