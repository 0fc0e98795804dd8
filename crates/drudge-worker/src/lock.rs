//! Filesystem singleton lock, one file per (queue, slot).
//!
//! The file holds the owning PID as text. Liveness is decided by probing the
//! process table, not by file age, so a stale file left by a crashed worker
//! never blocks a restart. This only guards workers sharing a lock
//! directory, which in practice means one host.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sysinfo::{Pid, System};

pub struct WorkerLock {
    path: PathBuf,
}

/// Stable file-name identity for a (queue, slot) pair.
fn worker_id(queue: &str, slot: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", queue, slot).as_bytes());
    hex::encode(hasher.finalize())
}

/// Lock files written by older workers may carry stray bytes around the PID;
/// keep the digits and fall back to 0 (never a live PID) on garbage.
fn parse_pid(raw: &str) -> u32 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn is_live(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_process(pid);
    system.process(pid).is_some()
}

impl WorkerLock {
    pub fn for_slot(lock_dir: &Path, queue: &str, slot: u32) -> Self {
        Self {
            path: lock_dir.join(format!("{}.lock", worker_id(queue, slot))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the lock file, if the file exists.
    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|raw| parse_pid(&raw))
    }

    /// True when the lock file exists and its recorded process is running.
    pub fn held_by_live_process(&self) -> bool {
        self.read_pid().map(is_live).unwrap_or(false)
    }

    /// Claim the lock for this process, overwriting any stale file.
    pub fn write_pid(&self) -> Result<()> {
        std::fs::write(&self.path, std::process::id().to_string())
            .with_context(|| format!("Failed to write lock file {}", self.path.display()))
    }

    /// Signal the recorded process to stop and drop the lock file. Both
    /// steps are best effort; a worker that already exited leaves nothing
    /// to signal and its file may already be gone.
    pub fn kill_holder(&self) {
        if let Some(pid) = self.read_pid() {
            if pid != 0 {
                let mut system = System::new();
                let pid = Pid::from_u32(pid);
                system.refresh_process(pid);
                if let Some(process) = system.process(pid) {
                    if !process.kill() {
                        tracing::warn!(pid = pid.as_u32(), "Failed to signal worker process");
                    }
                }
            }
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to remove lock file");
            }
        }
    }

    /// Drop our own lock file on clean shutdown.
    pub fn release(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
