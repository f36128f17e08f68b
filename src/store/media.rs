//! Content-addressed blob media store, per spec.md §4.3. Blobs are keyed
//! by record_id and written through the atomic-write layer.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::retention::PressureLevel;

fn safe_record_id(record_id: &str) -> String {
    record_id.replace('/', "__")
}

/// Shared interface over media store backends.
pub trait MediaStore: Send + Sync {
    /// Fails with an error if `record_id` already exists.
    fn put_new(&self, record_id: &str, bytes: &[u8]) -> Result<()>;
    /// Idempotent overwrite.
    fn put(&self, record_id: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, record_id: &str) -> Result<Option<Vec<u8>>>;
    fn exists(&self, record_id: &str) -> bool;
    fn count(&self) -> Result<u64>;
}

/// A single-root filesystem-backed blob store.
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsMediaStore { root: root.into() }
    }

    fn path_for(&self, record_id: &str) -> PathBuf {
        self.root.join(format!("{}.bin", safe_record_id(record_id)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MediaStore for FsMediaStore {
    fn put_new(&self, record_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(record_id);
        if path.exists() {
            anyhow::bail!(crate::error::ErrorKind::AlreadyExists(format!(
                "blob already exists for {record_id}"
            )));
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating media root {}", self.root.display()))?;
        atomic::atomic_write_bytes(&path, bytes)
    }

    fn put(&self, record_id: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating media root {}", self.root.display()))?;
        atomic::atomic_write_bytes(&self.path_for(record_id), bytes)
    }

    fn get(&self, record_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(record_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(&path)?))
    }

    fn exists(&self, record_id: &str) -> bool {
        self.path_for(record_id).exists()
    }

    fn count(&self) -> Result<u64> {
        if !self.root.exists() {
            return Ok(0);
        }
        Ok(std::fs::read_dir(&self.root)?.filter_map(|e| e.ok()).count() as u64)
    }
}

/// A pressure-aware store wrapping an ordered list of `(root, backend)`.
/// Writes above `on_level` route to the first backend whose pressure
/// severity is strictly lower than the primary's; reads fall through all
/// backends in order. Per spec.md §4.3 / §4.20.
pub struct SpilloverStore {
    backends: Vec<FsMediaStore>,
    on_level: PressureLevel,
}

impl SpilloverStore {
    pub fn new(roots: Vec<PathBuf>, on_level: PressureLevel) -> Self {
        SpilloverStore {
            backends: roots.into_iter().map(FsMediaStore::new).collect(),
            on_level,
        }
    }

    /// Choose a write target given the primary's current pressure level.
    /// Returns the index into `backends` to write through.
    pub fn choose_write_target(&self, primary_level: PressureLevel, levels: &[PressureLevel]) -> usize {
        if primary_level.severity() < self.on_level.severity() {
            return 0;
        }
        for (idx, lvl) in levels.iter().enumerate().skip(1) {
            if lvl.severity() < primary_level.severity() {
                return idx;
            }
        }
        0
    }

    pub fn put(&self, record_id: &str, bytes: &[u8], primary_level: PressureLevel, levels: &[PressureLevel]) -> Result<(usize, ())> {
        let idx = self.choose_write_target(primary_level, levels);
        self.backends[idx].put(record_id, bytes)?;
        Ok((idx, ()))
    }

    pub fn get(&self, record_id: &str) -> Result<Option<Vec<u8>>> {
        for backend in &self.backends {
            if let Some(bytes) = backend.get(record_id)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    pub fn exists(&self, record_id: &str) -> bool {
        self.backends.iter().any(|b| b.exists(record_id))
    }
}
