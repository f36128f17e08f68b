//! Consent gate: `<data_dir>/state/consent.capture.json`. Missing,
//! malformed, or `accepted: false` all fail closed. Grounded on
//! `autocapture_nx/kernel/consent.py`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::atomic;
use crate::models::Consent;
use crate::timebase;

pub fn consent_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state").join("consent.capture.json")
}

/// Read the consent file. Any failure to read or parse yields a
/// not-accepted `Consent`, never an error — this is the fail-closed gate.
pub fn load_capture_consent(data_dir: &Path) -> Consent {
    let path = consent_path(data_dir);
    match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str::<Consent>(&text).unwrap_or_default(),
        Err(_) => Consent::default(),
    }
}

/// Record acceptance atomically, stamping `accepted_ts_utc`.
pub fn accept_capture_consent(data_dir: &Path) -> Result<Consent> {
    let consent = Consent {
        schema_version: 1,
        accepted: true,
        accepted_ts_utc: Some(timebase::utc_now_z()),
    };
    let path = consent_path(data_dir);
    atomic::atomic_write_json(&path, &consent)
        .with_context(|| format!("writing consent file {}", path.display()))?;
    Ok(consent)
}

/// Gate for `run_start`: fails before any kernel work begins unless
/// consent has been accepted.
pub fn require_capture_consent(data_dir: &Path) -> Result<()> {
    let consent = load_capture_consent(data_dir);
    if !consent.accepted {
        anyhow::bail!(crate::error::ErrorKind::ConsentRequired(
            "capture consent not accepted".to_string()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_fails_closed() {
        let dir = tempdir().unwrap();
        let consent = load_capture_consent(dir.path());
        assert!(!consent.accepted);
        assert!(require_capture_consent(dir.path()).is_err());
    }

    #[test]
    fn malformed_file_fails_closed() {
        let dir = tempdir().unwrap();
        let path = consent_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        let consent = load_capture_consent(dir.path());
        assert!(!consent.accepted);
    }

    #[test]
    fn accept_then_require_succeeds() {
        let dir = tempdir().unwrap();
        let consent = accept_capture_consent(dir.path()).unwrap();
        assert!(consent.accepted);
        assert!(consent.accepted_ts_utc.is_some());
        assert!(require_capture_consent(dir.path()).is_ok());
    }

    #[test]
    fn explicit_false_fails_closed() {
        let dir = tempdir().unwrap();
        let path = consent_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"schema_version":1,"accepted":false}"#).unwrap();
        assert!(!load_capture_consent(dir.path()).accepted);
    }
}
