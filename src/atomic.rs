//! Atomic file writes: temp file in the same directory, fsync, rename,
//! fsync the parent directory. Mirrors `autocapture_nx/kernel/atomic_write.py`.
//!
//! On any failure the temp file is removed; on success no `.tmp` file is
//! ever left behind.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

fn tmp_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tmp");
    let pid = std::process::id();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    target.with_file_name(format!(".{file_name}.{pid}.{nonce}.tmp"))
}

fn fsync_dir(dir: &Path) -> Result<()> {
    let dirf = File::open(dir).with_context(|| format!("opening dir {}", dir.display()))?;
    dirf.sync_all()
        .with_context(|| format!("fsyncing dir {}", dir.display()))?;
    Ok(())
}

/// Write `bytes` to `target` atomically.
pub fn atomic_write_bytes(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating dir {}", dir.display()))?;
    let tmp = tmp_path_for(target);

    let result = (|| -> Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("creating temp file {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("writing temp file {}", tmp.display()))?;
        f.sync_all()
            .with_context(|| format!("fsyncing temp file {}", tmp.display()))?;
        drop(f);
        fs::rename(&tmp, target)
            .with_context(|| format!("renaming {} -> {}", tmp.display(), target.display()))?;
        fsync_dir(dir)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Write `text` to `target` atomically (UTF-8).
pub fn atomic_write_text(target: &Path, text: &str) -> Result<()> {
    atomic_write_bytes(target, text.as_bytes())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: serde::Serialize>(target: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing json")?;
    atomic_write_text(target, &text)
}

/// Append one NDJSON line to `target`, creating it if absent. Not itself
/// atomic (an append is a single `write(2)` under `O_APPEND`, which is the
/// durability unit logs rely on) but the caller's fsync-on-rotate policy
/// lives in `ledger.rs`/`journal.rs`.
pub fn append_ndjson_line<T: serde::Serialize>(target: &Path, value: &T) -> Result<()> {
    if let Some(dir) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut line = serde_json::to_string(value).context("serializing ndjson line")?;
    line.push('\n');
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(target)
        .with_context(|| format!("opening {} for append", target.display()))?;
    f.write_all(line.as_bytes())?;
    Ok(())
}
