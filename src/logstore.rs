//! Shared append-only NDJSON log primitive: file lock, fsync-on-append,
//! size-based rotation. Used by `ledger.rs`, `journal.rs`, and `anchor.rs`.
//! Grounded on the teacher's `ledger.rs` (`fs2` exclusive lock + rotation at
//! `MAX_SIZE` keeping `MAX_ROTATED` rotated files).

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED: usize = 5;

/// Append one already-serialized line (without trailing `\n`) to `path`
/// under an exclusive file lock, fsync, and rotate if the file has grown
/// past `MAX_SIZE`.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("creating log directory")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    file.lock_exclusive().context("locking log file")?;

    let mut out = line.to_string();
    out.push('\n');
    let write_result = file.write_all(out.as_bytes()).and_then(|_| file.sync_all());

    if write_result.is_err() {
        let _ = file.unlock();
        write_result.context("writing log line")?;
    }

    let size = file.metadata().ok().map(|m| m.len()).unwrap_or(0);
    if size > MAX_SIZE {
        drop(file);
        if let Err(e) = rotate_and_cleanup(path, MAX_ROTATED) {
            eprintln!("[autocapture] log rotation failed for {}: {e}", path.display());
        }
    } else {
        file.unlock().ok();
    }

    Ok(())
}

/// Read all lines of `path`, skipping blank lines. Missing file yields
/// an empty vec.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = std::io::BufReader::new(f);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading log line")?;
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

fn rotate_and_cleanup(log_path: &Path, keep: usize) -> std::io::Result<()> {
    let parent = log_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("log");

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let rotated_name = format!("{stem}.{ts}.ndjson");
    fs::rename(log_path, parent.join(rotated_name))?;

    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let mut rotated: Vec<(PathBuf, SystemTime)> = fs::read_dir(parent)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let matches = name.starts_with(stem)
                && name.ends_with(".ndjson")
                && name != log_path.file_name()?.to_str()?;
            if !matches {
                return None;
            }
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.path(), modified))
        })
        .collect();

    rotated.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in rotated.into_iter().skip(keep) {
        if let Err(e) = fs::remove_file(&path) {
            eprintln!("[autocapture] failed to remove rotated log {path:?}: {e}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.ndjson");
        append_line(&path, r#"{"a":1}"#).unwrap();
        append_line(&path, r#"{"a":2}"#).unwrap();
        let lines = read_lines(&path).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn rotates_past_max_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.ndjson");
        let chunk = "x".repeat(8192);
        let count = (10 * 1024 * 1024) / 8200 + 50;
        for _ in 0..count {
            append_line(&path, &format!(r#"{{"d":"{chunk}"}}"#)).unwrap();
        }
        let active_size = fs::metadata(&path).unwrap().len();
        assert!(active_size < 1024 * 1024);
        let rotated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with("big.") && name.ends_with(".ndjson") && name != "big.ndjson"
            })
            .collect();
        assert!(!rotated.is_empty());
    }
}
