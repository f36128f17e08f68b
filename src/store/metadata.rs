//! Indexed metadata record store (SQLite), per spec.md §3/§6.1.
//!
//! `metadata(id, record_type, ts_utc, payload, run_id)` and
//! `metadata_projection(id, record_type, ts_utc, ts_epoch)`. Access is
//! serialized through a single connection with bounded retry on transient
//! errors (`database is locked`, `disk I/O error`, `database disk image is
//! malformed`), per spec.md §5.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::models::Record;

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

fn is_transient(err: &rusqlite::Error) -> bool {
    let msg = err.to_string();
    msg.contains("database is locked")
        || msg.contains("disk I/O error")
        || msg.contains("database disk image is malformed")
}

pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).context("opening metadata.db")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                ts_utc TEXT NOT NULL,
                payload TEXT NOT NULL,
                run_id TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS metadata_projection (
                id TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                ts_utc TEXT NOT NULL,
                ts_epoch INTEGER
            );",
        )
        .context("creating metadata schema")?;
        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    fn with_retry<T>(&self, mut op: impl FnMut(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("metadata connection mutex poisoned");
        let mut attempt = 0;
        loop {
            match op(&conn) {
                Ok(v) => return Ok(v),
                Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    eprintln!(
                        "[autocapture] transient metadata store error (attempt {attempt}/{MAX_RETRIES}): {e}"
                    );
                    thread::sleep(RETRY_BACKOFF);
                }
                Err(e) => {
                    return Err(crate::error::ErrorKind::TransientIo(e.to_string()).into());
                }
            }
        }
    }

    /// Insert `record` and its `metadata_projection` row in one
    /// transaction. `ts_epoch` is left NULL (spec.md §9 open question:
    /// the source leaves it optional; gates only check row counts).
    pub fn insert(&self, record: &Record) -> Result<()> {
        let payload_text = serde_json::to_string(&record.payload).context("serializing payload")?;
        self.with_retry(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO metadata (id, record_type, ts_utc, payload, run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.record_id,
                    record.record_type,
                    record.ts_utc,
                    payload_text,
                    record.run_id
                ],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO metadata_projection (id, record_type, ts_utc, ts_epoch)
                 VALUES (?1, ?2, ?3, NULL)",
                params![record.record_id, record.record_type, record.ts_utc],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, record_id: &str) -> Result<Option<Record>> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT record_type, ts_utc, payload, run_id FROM metadata WHERE id = ?1",
                params![record_id],
                |row| {
                    let record_type: String = row.get(0)?;
                    let ts_utc: String = row.get(1)?;
                    let payload_text: String = row.get(2)?;
                    let run_id: String = row.get(3)?;
                    Ok((record_type, ts_utc, payload_text, run_id))
                },
            )
            .map(|(record_type, ts_utc, payload_text, run_id)| {
                let payload = serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null);
                Some(Record {
                    record_id: record_id.to_string(),
                    record_type,
                    ts_utc,
                    run_id,
                    payload,
                })
            })
            .or_else(|e| {
                if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                    Ok(None)
                } else {
                    Err(e)
                }
            })
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.with_retry(|conn| {
            conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
        })
    }

    /// Alignment gate: every `metadata` row has a matching
    /// `metadata_projection` row keyed by id + record_type + ts_utc.
    pub fn check_projection_alignment(&self) -> Result<bool> {
        self.with_retry(|conn| {
            let mismatched: i64 = conn.query_row(
                "SELECT COUNT(*) FROM metadata m
                 LEFT JOIN metadata_projection p
                   ON m.id = p.id AND m.record_type = p.record_type AND m.ts_utc = p.ts_utc
                 WHERE p.id IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(mismatched == 0)
        })
    }
}
