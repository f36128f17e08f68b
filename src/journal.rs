//! Operational telemetry: disk pressure, capture silence, watchdog events.
//! Append-only NDJSON, separate from the ledger (which records stage
//! transitions, not operational noise). Grounded on spec.md §3/§4.6.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::logstore;
use crate::models::JournalEvent;
use crate::timebase;

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub fn journal_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("journal.ndjson")
}

/// Append one operational event. `sequence` is monotonic per process
/// (spec.md §5's per-writer total order guarantee).
pub fn append(
    path: &Path,
    run_id: &str,
    tzid: &str,
    event_type: &str,
    payload: Value,
) -> Result<JournalEvent> {
    let now = chrono::Utc::now();
    let event = JournalEvent {
        schema_version: 1,
        event_id: uuid::Uuid::new_v4().to_string(),
        sequence: SEQUENCE.fetch_add(1, Ordering::SeqCst),
        ts_utc: timebase::utc_iso_z(now),
        tzid: tzid.to_string(),
        offset_minutes: timebase::tz_offset_minutes(tzid, now),
        event_type: event_type.to_string(),
        payload,
        run_id: run_id.to_string(),
    };
    let line = serde_json::to_string(&event).context("serializing journal event")?;
    logstore::append_line(path, &line)?;
    Ok(event)
}

pub fn read_all(path: &Path) -> Result<Vec<JournalEvent>> {
    logstore::read_lines(path)?
        .into_iter()
        .map(|line| serde_json::from_str(&line).context("parsing journal event"))
        .collect()
}

/// Read only events of a given `event_type`, in file order.
pub fn read_by_type(path: &Path, event_type: &str) -> Result<Vec<JournalEvent>> {
    Ok(read_all(path)?
        .into_iter()
        .filter(|e| e.event_type == event_type)
        .collect())
}
