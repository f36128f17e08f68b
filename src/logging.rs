//! Structured NDJSON diagnostic logging for anything that isn't a direct
//! CLI response (collector lifecycle, gate runs, plugin loads). Ported
//! from `autocapture_nx/kernel/logging.py`'s `JsonlLogger`, built on the
//! shared [`crate::logstore`] append/rotate primitive rather than
//! hand-rolled file IO, and redacted through [`crate::redaction`] before
//! any line is written.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::logstore;
use crate::redaction;
use crate::timebase;

pub struct DiagnosticLogger {
    path: PathBuf,
}

impl DiagnosticLogger {
    pub fn new(data_dir: &Path, name: &str) -> Self {
        DiagnosticLogger { path: data_dir.join("logs").join(format!("{name}.ndjson")) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Emits one structured event. `fields` is redacted before
    /// serialization; `event` and `correlation_id` are left as-is since
    /// they are caller-controlled identifiers, not user content.
    pub fn event(&self, event: &str, correlation_id: &str, fields: Value) -> Result<()> {
        let redacted_fields = redaction::redact_value(&fields);
        let line = serde_json::to_string(&serde_json::json!({
            "ts_utc": timebase::utc_now_z(),
            "event": event,
            "correlation_id": correlation_id,
            "fields": redacted_fields,
        }))
        .context("serializing diagnostic log event")?;
        logstore::append_line(&self.path, &line)
    }

    pub fn read_all(&self) -> Result<Vec<Value>> {
        logstore::read_lines(&self.path)?
            .into_iter()
            .map(|line| serde_json::from_str(&line).context("parsing diagnostic log line"))
            .collect()
    }
}
