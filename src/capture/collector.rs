//! Disk-pressure-aware frame/event collector, per spec.md §4.10.
//!
//! Starting requires consent and that every component with `enabled: true`
//! actually has a provider; optional trackers may be silently absent.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::consent;
use crate::journal;
use crate::ledger;
use crate::logging::DiagnosticLogger;
use crate::models::Record;
use crate::retention;
use crate::spool::OverflowSpool;
use crate::store::media::MediaStore;
use crate::store::metadata::MetadataStore;
use crate::timebase;

#[derive(Debug, Clone, Serialize)]
pub struct ComponentFailure {
    pub component: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResult {
    pub ok: bool,
    pub error: Option<String>,
    pub errors: Vec<ComponentFailure>,
}

/// A provider capable of backing a named capture component (screenshot,
/// audio, input, window metadata, cursor, clipboard, file activity). The
/// capability registry supplies these; a missing provider for a
/// `required: true` component is a startup failure, not a silent no-op.
pub trait ComponentProvider: Send + Sync {
    fn name(&self) -> &str;
}

pub struct ComponentSpec {
    pub name: String,
    pub enabled: bool,
    pub required: bool,
}

/// Evaluate start preconditions: consent accepted, and every `enabled &&
/// required` component has a provider. Distinguishes "disabled in
/// config" from "failed to start".
pub fn evaluate_start(
    data_dir: &Path,
    specs: &[ComponentSpec],
    available_providers: &[String],
) -> StartResult {
    let diagnostics = DiagnosticLogger::new(data_dir, "capture");

    if consent::require_capture_consent(data_dir).is_err() {
        let _ = diagnostics.event("collector.start_failed", "start", serde_json::json!({"reason": "consent_required"}));
        return StartResult {
            ok: false,
            error: Some("consent_required".to_string()),
            errors: vec![],
        };
    }

    let mut errors = Vec::new();
    for spec in specs {
        if spec.enabled && spec.required && !available_providers.contains(&spec.name) {
            errors.push(ComponentFailure {
                component: spec.name.clone(),
                reason: "no_provider".to_string(),
            });
        }
    }

    if !errors.is_empty() {
        let _ = diagnostics.event(
            "collector.start_failed",
            "start",
            serde_json::json!({"reason": "component_start_failed", "errors": &errors}),
        );
        return StartResult {
            ok: false,
            error: Some("component_start_failed".to_string()),
            errors,
        };
    }

    let _ = diagnostics.event("collector.started", "start", serde_json::json!({}));
    StartResult {
        ok: true,
        error: None,
        errors: vec![],
    }
}

pub struct CaptureCollector<'a> {
    pub config: &'a Config,
    pub metadata: &'a MetadataStore,
    pub media: &'a dyn MediaStore,
    pub spool: &'a mut OverflowSpool,
    pub ledger_path: std::path::PathBuf,
    pub journal_path: std::path::PathBuf,
    pub diagnostics: DiagnosticLogger,
}

impl<'a> CaptureCollector<'a> {
    /// Handle one captured frame/blob per spec.md §4.10: evaluate
    /// pressure, write to spool on hard halt else to the primary store,
    /// then append ledger + journal entries on success.
    pub fn capture_frame(&mut self, record_id: &str, blob: &[u8], payload: serde_json::Value) -> Result<()> {
        let ts_utc = timebase::utc_now_z();
        let report = retention::evaluate_disk_pressure(
            &self.config.storage.disk_pressure,
            &self.config.data_dir(),
        )?;

        if retention::should_pause_capture(&report) {
            self.spool
                .write_item(record_id, payload, blob, "png", &ts_utc)?;
            journal::append(
                &self.journal_path,
                &self.config.runtime.run_id,
                &self.config.runtime.timezone,
                "capture.halt_disk",
                serde_json::json!({"record_id": record_id, "level": report.level}),
            )?;
            let _ = self.diagnostics.event(
                "collector.halt_disk",
                record_id,
                serde_json::json!({"level": report.level}),
            );
            return Ok(());
        }

        self.media.put(record_id, blob)?;
        let record = Record::new(
            &self.config.runtime.run_id,
            "evidence.capture.frame",
            0,
            ts_utc.clone(),
            payload,
        );
        let mut record = record;
        record.record_id = record_id.to_string();
        self.metadata.insert(&record)?;

        ledger::append(
            &self.ledger_path,
            "capture.write",
            vec![],
            vec![record.content_hash()],
            serde_json::json!({"record_id": record_id}),
        )?;
        journal::append(
            &self.journal_path,
            &self.config.runtime.run_id,
            &self.config.runtime.timezone,
            "capture.write",
            serde_json::json!({"record_id": record_id}),
        )?;
        let _ = self.diagnostics.event("collector.write", record_id, serde_json::json!({}));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn start_fails_without_consent() {
        let dir = tempdir().unwrap();
        let result = evaluate_start(dir.path(), &[], &[]);
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("consent_required"));
    }

    #[test]
    fn required_component_missing_provider_fails_distinctly() {
        let dir = tempdir().unwrap();
        consent::accept_capture_consent(dir.path()).unwrap();
        let specs = vec![ComponentSpec {
            name: "screenshot".to_string(),
            enabled: true,
            required: true,
        }];
        let result = evaluate_start(dir.path(), &specs, &[]);
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("component_start_failed"));
        assert_eq!(result.errors[0].component, "screenshot");
    }

    #[test]
    fn disabled_optional_component_does_not_block_start() {
        let dir = tempdir().unwrap();
        consent::accept_capture_consent(dir.path()).unwrap();
        let specs = vec![ComponentSpec {
            name: "audio".to_string(),
            enabled: false,
            required: true,
        }];
        let result = evaluate_start(dir.path(), &specs, &[]);
        assert!(result.ok);
    }

    #[test]
    fn capture_frame_under_hard_halt_uses_spool_not_primary() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_string_lossy().to_string();
        config.storage.disk_pressure.watermark_hard_mb = u64::MAX; // force hard_halt always
        let metadata = MetadataStore::open(&dir.path().join("metadata.db")).unwrap();
        let media = crate::store::media::FsMediaStore::new(dir.path().join("media"));
        let mut spool = OverflowSpool::new(dir.path().join("overflow"), std::time::Duration::from_secs(30), 50);

        let mut collector = CaptureCollector {
            config: &config,
            metadata: &metadata,
            media: &media,
            spool: &mut spool,
            ledger_path: dir.path().join("ledger.ndjson"),
            journal_path: dir.path().join("journal.ndjson"),
            diagnostics: DiagnosticLogger::new(dir.path(), "capture"),
        };

        collector
            .capture_frame("run/frame/1", b"png-bytes", serde_json::json!({}))
            .unwrap();

        assert_eq!(spool.pending_count().unwrap(), 1);
        assert!(!media.exists("run/frame/1"));

        let events = collector.diagnostics.read_all().unwrap();
        assert_eq!(events[0]["event"], serde_json::json!("collector.halt_disk"));
    }

    #[test]
    fn start_failure_is_logged_to_diagnostics() {
        let dir = tempdir().unwrap();
        let result = evaluate_start(dir.path(), &[], &[]);
        assert!(!result.ok);
        let logger = DiagnosticLogger::new(dir.path(), "capture");
        let events = logger.read_all().unwrap();
        assert_eq!(events[0]["event"], serde_json::json!("collector.start_failed"));
    }
}
