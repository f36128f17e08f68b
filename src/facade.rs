//! UX façade: single-entry API over a kernel session. Coordinates
//! run/pause/query/verify and owns the per-`data_dir` instance lock. Per
//! spec.md §5/§6.1 (`state/run_state.json`).

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::error::ErrorKind;
use crate::timebase;

fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state").join("instance.lock")
}

fn run_state_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state").join("run_state.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub state: String,
    pub ts_utc: String,
    pub tzid: String,
    pub offset_minutes: i32,
}

/// A held instance lock for `data_dir`. Dropping it releases the lock;
/// only one kernel may hold it per data directory.
pub struct InstanceLock {
    file: File,
    data_dir: PathBuf,
}

impl InstanceLock {
    /// Acquires the lock, or returns `ErrorKind::ConfigError` (callers
    /// surface this as `instance_lock_held`) if another process holds it.
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        let path = lock_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating state dir")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening instance lock {}", path.display()))?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(ErrorKind::ConfigError("instance_lock_held".to_string()))
        })?;
        Ok(InstanceLock { file, data_dir: data_dir.to_path_buf() })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

pub struct Facade {
    pub data_dir: PathBuf,
    pub run_id: String,
    pub tzid: String,
    _lock: InstanceLock,
}

impl Facade {
    pub fn open(data_dir: &Path, run_id: &str, tzid: &str) -> Result<Self> {
        let lock = InstanceLock::acquire(data_dir)?;
        Ok(Facade {
            data_dir: data_dir.to_path_buf(),
            run_id: run_id.to_string(),
            tzid: tzid.to_string(),
            _lock: lock,
        })
    }

    fn write_state(&self, state: &str) -> Result<RunState> {
        let normalized = timebase::normalize_time(&self.tzid, chrono::Utc::now());
        let run_state = RunState {
            run_id: self.run_id.clone(),
            state: state.to_string(),
            ts_utc: normalized.ts_utc,
            tzid: normalized.tzid,
            offset_minutes: normalized.offset_minutes,
        };
        atomic::atomic_write_json(&run_state_path(&self.data_dir), &run_state)?;
        Ok(run_state)
    }

    pub fn run(&self) -> Result<RunState> {
        self.write_state("running")
    }

    pub fn pause(&self) -> Result<RunState> {
        self.write_state("paused")
    }

    pub fn read_state(&self) -> Result<Option<RunState>> {
        let path = run_state_path(&self.data_dir);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn run_then_pause_updates_state() {
        let dir = tempdir().unwrap();
        let facade = Facade::open(dir.path(), "run1", "UTC").unwrap();
        facade.run().unwrap();
        assert_eq!(facade.read_state().unwrap().unwrap().state, "running");
        facade.pause().unwrap();
        assert_eq!(facade.read_state().unwrap().unwrap().state, "paused");
    }

    #[test]
    fn second_lock_acquisition_fails_while_first_is_held() {
        let dir = tempdir().unwrap();
        let _first = Facade::open(dir.path(), "run1", "UTC").unwrap();
        let second = Facade::open(dir.path(), "run2", "UTC");
        assert!(second.is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        {
            let _first = Facade::open(dir.path(), "run1", "UTC").unwrap();
        }
        let second = Facade::open(dir.path(), "run2", "UTC");
        assert!(second.is_ok());
    }
}
