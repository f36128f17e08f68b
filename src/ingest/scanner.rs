//! Walks the spool root for `session_*` directories containing both
//! `manifest.json` and `COMPLETE.json`; tracks processed sessions in a
//! small SQLite state DB. Per spec.md §4.11.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct SessionScanner {
    spool_root: PathBuf,
    conn: Mutex<Connection>,
}

impl SessionScanner {
    pub fn open(spool_root: impl Into<PathBuf>, state_db_path: &Path) -> Result<Self> {
        if let Some(parent) = state_db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(state_db_path).context("opening processed_sessions db")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS processed_sessions (session_id TEXT PRIMARY KEY, processed_ts_utc TEXT NOT NULL)",
        )?;
        Ok(SessionScanner {
            spool_root: spool_root.into(),
            conn: Mutex::new(conn),
        })
    }

    /// Completed session directories under the spool root, in
    /// lexicographic name order (spec.md §5's scanner ordering
    /// guarantee).
    pub fn list_completed(&self) -> Result<Vec<PathBuf>> {
        if !self.spool_root.exists() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.spool_root)
            .with_context(|| format!("scanning spool root {}", self.spool_root.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("session_"))
                        .unwrap_or(false)
                    && p.join("manifest.json").exists()
                    && p.join("COMPLETE.json").exists()
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    fn session_id_of(dir: &Path) -> String {
        dir.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string()
    }

    fn is_processed(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("scanner connection mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM processed_sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Set-difference of completed sessions minus already-processed ones,
    /// in stable (lexicographic) order.
    pub fn list_pending(&self) -> Result<Vec<PathBuf>> {
        let completed = self.list_completed()?;
        let mut pending = Vec::new();
        for dir in completed {
            let sid = Self::session_id_of(&dir);
            if !self.is_processed(&sid)? {
                pending.push(dir);
            }
        }
        Ok(pending)
    }

    pub fn mark_processed(&self, session_dir: &Path, ts_utc: &str) -> Result<()> {
        let sid = Self::session_id_of(session_dir);
        let conn = self.conn.lock().expect("scanner connection mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO processed_sessions (session_id, processed_ts_utc) VALUES (?1, ?2)",
            params![sid, ts_utc],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_completed_session(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("manifest.json"), "{}").unwrap();
        std::fs::write(dir.join("COMPLETE.json"), "{}").unwrap();
    }

    #[test]
    fn list_completed_only_includes_marked_sessions() {
        let dir = tempdir().unwrap();
        make_completed_session(dir.path(), "session_a");
        std::fs::create_dir_all(dir.path().join("session_b")).unwrap();
        std::fs::write(dir.path().join("session_b/manifest.json"), "{}").unwrap();

        let scanner = SessionScanner::open(dir.path(), &dir.path().join("state.db")).unwrap();
        let completed = scanner.list_completed().unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn pending_excludes_processed_sessions() {
        let dir = tempdir().unwrap();
        make_completed_session(dir.path(), "session_a");
        make_completed_session(dir.path(), "session_b");

        let scanner = SessionScanner::open(dir.path(), &dir.path().join("state.db")).unwrap();
        assert_eq!(scanner.list_pending().unwrap().len(), 2);

        scanner
            .mark_processed(&dir.path().join("session_a"), "t0")
            .unwrap();
        let pending = scanner.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].ends_with("session_b"));
    }

    #[test]
    fn sessions_iterate_in_lexicographic_order() {
        let dir = tempdir().unwrap();
        make_completed_session(dir.path(), "session_b");
        make_completed_session(dir.path(), "session_a");
        let scanner = SessionScanner::open(dir.path(), &dir.path().join("state.db")).unwrap();
        let completed = scanner.list_completed().unwrap();
        assert!(completed[0].ends_with("session_a"));
        assert!(completed[1].ends_with("session_b"));
    }
}
