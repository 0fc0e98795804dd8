//! Command-line entry points for a drudge deployment.
//!
//! This crate is wired into a binary by the embedding application: build a
//! [`QueueRegistry`] with your queues and handlers, then hand it to [`run`].
//!
//! ```no_run
//! # use drudge_worker::QueueRegistry;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = QueueRegistry::new();
//!     // registry.register(config, handler)?;
//!     drudge_cli::run(registry).await
//! }
//! ```
//!
//! Set DATABASE_URL (a `.env` file works) before invoking any command.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use drudge_core::Journal;
use drudge_db::{PgLogStore, PgTaskStore};
use drudge_worker::{
    stop_worker, LogJournal, NullJournal, QueueMonitor, QueueRegistry, Registration, WorkerRunner,
};

#[derive(Parser)]
#[command(name = "drudge", about = "Background task queue runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create missing task and log tables for every registered queue
    Provision,
    /// Run the worker loop for one queue slot (blocks until stopped)
    Run {
        /// Queue name
        queue: String,
        /// Worker slot name, `worker_N`
        #[arg(long, default_value = "worker_0")]
        worker: String,
    },
    /// Stop running workers by removing their locks and signalling them
    Stop {
        /// Queue to stop; omit with --all to stop every queue
        queue: Option<String>,
        /// Stop workers of all registered queues
        #[arg(long)]
        all: bool,
    },
    /// Run the housekeeping pass: overflow check and/or log rotation
    Monitor {
        /// Only the overflow check
        #[arg(long)]
        check: bool,
        /// Only the log rotation sweep
        #[arg(long)]
        logrotate: bool,
    },
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Slot number from a `worker_N` name. Anything malformed maps to slot 0 so
/// a typo degrades to the default worker instead of refusing to start.
pub fn parse_worker_slot(name: &str) -> u32 {
    match name.strip_prefix("worker_").and_then(|n| n.parse().ok()) {
        Some(slot) => slot,
        None => {
            tracing::warn!(name = name, "Unrecognized worker name, using slot 0");
            0
        }
    }
}

pub async fn connect_pool() -> Result<PgPool> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("Failed to connect to the database")
}

/// Parse arguments from the process command line and execute.
pub async fn run(registry: QueueRegistry) -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let pool = connect_pool().await?;
    execute(cli, &registry, pool).await
}

pub async fn execute(cli: Cli, registry: &QueueRegistry, pool: PgPool) -> Result<()> {
    match cli.command {
        Commands::Provision => provision(registry, pool).await,
        Commands::Run { queue, worker } => {
            let registration = lookup(registry, &queue)?;
            run_worker(registration, parse_worker_slot(&worker), pool).await
        }
        Commands::Stop { queue, all } => {
            if all {
                for registration in registry.iter() {
                    stop_queue(registration);
                }
                Ok(())
            } else {
                let queue = queue.context("Pass a queue name or --all")?;
                stop_queue(lookup(registry, &queue)?);
                Ok(())
            }
        }
        Commands::Monitor { check, logrotate } => {
            // With neither flag, do both.
            let both = !check && !logrotate;
            for registration in registry.iter() {
                monitor(registration, pool.clone(), check || both, logrotate || both).await?;
            }
            Ok(())
        }
    }
}

fn lookup<'a>(registry: &'a QueueRegistry, queue: &str) -> Result<&'a Registration> {
    match registry.get(queue) {
        Some(registration) => Ok(registration),
        None => bail!(
            "unknown queue {:?}; registered queues: {}",
            queue,
            registry.names().join(", ")
        ),
    }
}

async fn provision(registry: &QueueRegistry, pool: PgPool) -> Result<()> {
    if registry.is_empty() {
        tracing::warn!("No queues registered, nothing to provision");
        return Ok(());
    }
    for registration in registry.iter() {
        let config = &registration.config;
        PgTaskStore::new(pool.clone(), config).provision().await?;
        if config.logs_on {
            PgLogStore::new(pool.clone(), &config.logs_table_name())?
                .provision()
                .await?;
        }
    }
    Ok(())
}

async fn run_worker(registration: &Registration, slot: u32, pool: PgPool) -> Result<()> {
    let config = registration.config.clone();
    let store = Arc::new(PgTaskStore::new(pool.clone(), &config));
    let journal: Box<dyn Journal> = if config.logs_on {
        Box::new(LogJournal::new(PgLogStore::new(
            pool,
            &config.logs_table_name(),
        )?))
    } else {
        Box::new(NullJournal)
    };

    let mut runner = WorkerRunner::new(config, slot, store, registration.handler.clone(), journal)?;
    runner.run().await
}

fn stop_queue(registration: &Registration) {
    let config = &registration.config;
    for slot in 0..config.worker_count {
        stop_worker(config, slot);
    }
}

async fn monitor(
    registration: &Registration,
    pool: PgPool,
    check: bool,
    logrotate: bool,
) -> Result<()> {
    let config = registration.config.clone();
    let store = Arc::new(PgTaskStore::new(pool.clone(), &config));
    let logs = PgLogStore::new(pool, &config.logs_table_name())?;
    let monitor = QueueMonitor::new(config, registration.handler.clone(), store, logs);

    if check {
        monitor.check_overflow().await;
    }
    if logrotate {
        monitor.rotate_logs().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn worker_names_parse_to_slots() {
        assert_eq!(parse_worker_slot("worker_0"), 0);
        assert_eq!(parse_worker_slot("worker_7"), 7);
        assert_eq!(parse_worker_slot("worker_12"), 12);
    }

    #[test]
    fn malformed_worker_names_fall_back_to_slot_zero() {
        assert_eq!(parse_worker_slot(""), 0);
        assert_eq!(parse_worker_slot("worker"), 0);
        assert_eq!(parse_worker_slot("worker_"), 0);
        assert_eq!(parse_worker_slot("worker_x"), 0);
        assert_eq!(parse_worker_slot("7"), 0);
    }

    #[test]
    fn run_defaults_to_worker_zero() {
        let cli = Cli::try_parse_from(["drudge", "run", "mail"]).unwrap();
        match cli.command {
            Commands::Run { queue, worker } => {
                assert_eq!(queue, "mail");
                assert_eq!(worker, "worker_0");
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn monitor_flags_are_independent() {
        let cli = Cli::try_parse_from(["drudge", "monitor", "--check"]).unwrap();
        match cli.command {
            Commands::Monitor { check, logrotate } => {
                assert!(check);
                assert!(!logrotate);
            }
            _ => panic!("expected monitor command"),
        }
    }
}
