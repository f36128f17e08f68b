//! Durable overflow spool: used when the primary volume reports
//! `hard_halt`. Layout: `<root>/pending/<safe(record_id)>.json` (metadata)
//! plus a sibling blob file. Grounded on
//! `autocapture_nx/capture/overflow_spool.py`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::atomic;

fn safe_name(record_id: &str) -> String {
    record_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMeta {
    pub record_id: String,
    pub payload: Value,
    pub ts_utc: String,
    pub blob_ext: String,
}

pub struct OverflowSpool {
    root: PathBuf,
    drain_interval: Duration,
    max_drain_per_tick: usize,
    last_drain_attempt: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrainReport {
    pub drained: u64,
    pub pending: u64,
    pub skipped: u64,
    pub enabled: bool,
}

impl OverflowSpool {
    pub fn new(root: impl Into<PathBuf>, drain_interval: Duration, max_drain_per_tick: usize) -> Self {
        OverflowSpool {
            root: root.into(),
            drain_interval,
            max_drain_per_tick,
            last_drain_attempt: None,
        }
    }

    fn pending_dir(&self) -> PathBuf {
        self.root.join("pending")
    }

    fn meta_path(&self, record_id: &str) -> PathBuf {
        self.pending_dir().join(format!("{}.json", safe_name(record_id)))
    }

    fn blob_path(&self, record_id: &str, ext: &str) -> PathBuf {
        self.pending_dir().join(format!("{}.{ext}", safe_name(record_id)))
    }

    /// Write blob then metadata, both atomically. Blob first so a crash
    /// between the two writes never leaves metadata referencing a
    /// nonexistent blob.
    pub fn write_item(&self, record_id: &str, payload: Value, blob: &[u8], blob_ext: &str, ts_utc: &str) -> Result<()> {
        std::fs::create_dir_all(self.pending_dir())
            .with_context(|| format!("creating spool dir {}", self.pending_dir().display()))?;
        atomic::atomic_write_bytes(&self.blob_path(record_id, blob_ext), blob)?;
        let meta = PendingMeta {
            record_id: record_id.to_string(),
            payload,
            ts_utc: ts_utc.to_string(),
            blob_ext: blob_ext.to_string(),
        };
        atomic::atomic_write_json(&self.meta_path(record_id), &meta)?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<u64> {
        let dir = self.pending_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let n = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
            .count();
        Ok(n as u64)
    }

    /// Oldest-pending-first ordering, by lexicographically sorted
    /// metadata file name (spec.md §5's "lex-sorted" drain order).
    fn list_pending_meta(&self) -> Result<Vec<PathBuf>> {
        let dir = self.pending_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Gate on the drain interval; if due, drain up to
    /// `max_drain_per_tick` oldest items, invoking `drain_fn(meta, blob)`
    /// for each. On `true`, both files are removed. On `false` or
    /// corruption, the item is skipped and left in place.
    pub fn drain_if_due(
        &mut self,
        now: Instant,
        mut drain_fn: impl FnMut(&PendingMeta, &[u8]) -> bool,
    ) -> Result<DrainReport> {
        let due = match self.last_drain_attempt {
            None => true,
            Some(last) => now.duration_since(last) >= self.drain_interval,
        };
        if !due {
            return Ok(DrainReport {
                drained: 0,
                pending: self.pending_count()?,
                skipped: 0,
                enabled: true,
            });
        }
        self.last_drain_attempt = Some(now);

        let meta_files = self.list_pending_meta()?;
        let mut drained = 0u64;
        let mut skipped = 0u64;

        for meta_path in meta_files.into_iter().take(self.max_drain_per_tick) {
            let meta: PendingMeta = match std::fs::read_to_string(&meta_path)
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok())
            {
                Some(m) => m,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            let blob_path = self.blob_path(&meta.record_id, &meta.blob_ext);
            let blob = match std::fs::read(&blob_path) {
                Ok(b) => b,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            if drain_fn(&meta, &blob) {
                let _ = std::fs::remove_file(&meta_path);
                let _ = std::fs::remove_file(&blob_path);
                drained += 1;
            }
        }

        Ok(DrainReport {
            drained,
            pending: self.pending_count()?,
            skipped,
            enabled: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_item_creates_both_files() {
        let dir = tempdir().unwrap();
        let spool = OverflowSpool::new(dir.path(), Duration::from_secs(30), 50);
        spool
            .write_item("run/frame/1", serde_json::json!({"record_type":"evidence.capture.frame"}), b"png-bytes", "png", "t0")
            .unwrap();
        assert_eq!(spool.pending_count().unwrap(), 1);
    }

    #[test]
    fn drain_true_removes_both_files() {
        let dir = tempdir().unwrap();
        let mut spool = OverflowSpool::new(dir.path(), Duration::from_secs(0), 50);
        spool
            .write_item("run/frame/1", serde_json::json!({}), b"png-bytes", "png", "t0")
            .unwrap();
        let report = spool
            .drain_if_due(Instant::now(), |meta, blob| {
                meta.record_id == "run/frame/1" && blob == b"png-bytes"
            })
            .unwrap();
        assert_eq!(report.drained, 1);
        assert_eq!(report.pending, 0);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn drain_false_keeps_both_files() {
        let dir = tempdir().unwrap();
        let mut spool = OverflowSpool::new(dir.path(), Duration::from_secs(0), 50);
        spool
            .write_item("run/frame/1", serde_json::json!({}), b"png-bytes", "png", "t0")
            .unwrap();
        let report = spool.drain_if_due(Instant::now(), |_, _| false).unwrap();
        assert_eq!(report.drained, 0);
        assert_eq!(report.pending, 1);
    }

    #[test]
    fn corrupt_metadata_is_skipped_not_deleted() {
        let dir = tempdir().unwrap();
        let mut spool = OverflowSpool::new(dir.path(), Duration::from_secs(0), 50);
        std::fs::create_dir_all(dir.path().join("pending")).unwrap();
        std::fs::write(dir.path().join("pending").join("bad.json"), "not json").unwrap();
        let report = spool.drain_if_due(Instant::now(), |_, _| true).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(dir.path().join("pending").join("bad.json").exists());
    }

    #[test]
    fn not_due_yet_skips_drain_attempt() {
        let dir = tempdir().unwrap();
        let mut spool = OverflowSpool::new(dir.path(), Duration::from_secs(3600), 50);
        spool
            .write_item("run/frame/1", serde_json::json!({}), b"x", "png", "t0")
            .unwrap();
        spool.drain_if_due(Instant::now(), |_, _| true).unwrap();
        let report = spool.drain_if_due(Instant::now(), |_, _| true).unwrap();
        assert_eq!(report.drained, 0);
        assert_eq!(report.pending, 0);
    }
}
