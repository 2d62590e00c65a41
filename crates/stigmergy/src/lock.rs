//! Process-level run lock.
//!
//! Distinct from the per-file scope lock (§4.3) tracked inside the status
//! map: this lock prevents two `stigmergy` processes from driving the same
//! state directory at once. Acquire writes a small info file via
//! tmp-then-rename, a stale lock (holder process gone) can be reclaimed,
//! and `Drop` releases best-effort.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LOCK_FILE_NAME: &str = "run.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub hostname: String,
    pub acquired_at: DateTime<Utc>,
    pub run_id: String,
}

/// Holds a process-level lock on a state directory for the lifetime of a
/// run. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    held: bool,
}

impl RunLock {
    fn lock_path(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCK_FILE_NAME)
    }

    /// Acquire the lock, failing immediately if another live run holds it.
    pub fn acquire(state_dir: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;

        let path = Self::lock_path(state_dir);
        if path.exists() {
            let info = Self::read_lock_info(&path)?;
            bail!(
                "state directory is locked by pid {} on {} (run {}); use --resume or remove {} if that process is gone",
                info.pid,
                info.hostname,
                info.run_id,
                path.display()
            );
        }

        Self::write_lock_file(&path, run_id)?;
        Ok(Self { path, held: true })
    }

    /// Acquire the lock, reclaiming a stale or corrupt lock file after
    /// `timeout` has elapsed since it was written.
    pub fn acquire_with_timeout(state_dir: &Path, run_id: &str, timeout: Duration) -> Result<Self> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;

        let path = Self::lock_path(state_dir);
        if path.exists() {
            let stale = match Self::read_lock_info(&path) {
                Ok(info) => {
                    let age = Utc::now().signed_duration_since(info.acquired_at);
                    age.to_std().map(|a| a >= timeout).unwrap_or(false)
                }
                Err(_) => true,
            };

            if stale {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove stale lock {}", path.display()))?;
            } else {
                let info = Self::read_lock_info(&path)?;
                bail!(
                    "state directory is locked by pid {} on {} (run {})",
                    info.pid,
                    info.hostname,
                    info.run_id
                );
            }
        }

        Self::write_lock_file(&path, run_id)?;
        Ok(Self { path, held: true })
    }

    fn write_lock_file(path: &Path, run_id: &str) -> Result<()> {
        let info = LockInfo {
            pid: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().to_string(),
            acquired_at: Utc::now(),
            run_id: run_id.to_string(),
        };
        let json = serde_json::to_vec_pretty(&info).context("failed to serialize lock info")?;

        let tmp_path = path.with_extension("lock.tmp");
        fs::write(&tmp_path, &json)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to finalize {}", path.display()))?;
        Ok(())
    }

    pub fn read_lock_info(path: &Path) -> Result<LockInfo> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read lock {}", path.display()))?;
        serde_json::from_slice(&bytes).context("failed to parse lock file")
    }

    pub fn release(&mut self) -> Result<()> {
        if self.held && self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove lock {}", self.path.display()))?;
        }
        self.held = false;
        Ok(())
    }

    pub fn is_locked(state_dir: &Path) -> bool {
        Self::lock_path(state_dir).exists()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
