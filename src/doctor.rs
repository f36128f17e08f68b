//! `autocapture doctor`: a read-only health matrix over the 12 capability
//! kinds (spec.md §4.18) plus the ledger, anchor chain, disk pressure, and
//! consent state. Grounded on the teacher's `doctor.rs` check/pass/fail
//! shape, generalized from its MCP-registration checks to capability
//! presence.

use serde::Serialize;
use std::path::Path;

use crate::output::{cprintln, format_size, BOLD, CYAN, DIM, GREEN, RED, RESET};
use crate::plugins::kinds::DOCTOR_CAPABILITIES;
use crate::plugins::manager::PluginManager;
use crate::{anchor, config::Config, consent, ledger, retention};

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityCheck {
    pub capability: String,
    pub ok: bool,
    pub detail: String,
    pub checked_at_utc: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub capabilities: Vec<CapabilityCheck>,
    pub ledger_ok: bool,
    pub anchor_ok: bool,
    pub disk_pressure: String,
    pub consent_accepted: bool,
    pub passed: u32,
    pub failed: u32,
}

fn capability_checks(manager: &PluginManager, config: &Config) -> Vec<CapabilityCheck> {
    let enabled = manager.enabled_plugin_ids(&config.plugins);
    DOCTOR_CAPABILITIES
        .iter()
        .map(|cap| {
            let count = manager
                .find_extensions(&config.plugins, cap, None)
                .into_iter()
                .filter(|slot| enabled.contains(&slot.plugin_id))
                .count();
            CapabilityCheck {
                capability: cap.to_string(),
                ok: count > 0,
                detail: if count > 0 {
                    format!("{count} provider(s) enabled")
                } else {
                    "no enabled plugin provides this capability".to_string()
                },
                checked_at_utc: crate::timebase::utc_now_z(),
            }
        })
        .collect()
}

/// Runs the full matrix and returns a structured report without printing
/// anything — used by `codex validate`'s `cli_json` validators and tests.
pub fn check(data_dir: &Path, config: &Config, manager: &PluginManager) -> DoctorReport {
    let capabilities = capability_checks(manager, config);

    let ledger_ok = ledger::verify(&ledger::ledger_path(data_dir))
        .map(|r| r.ok)
        .unwrap_or(false);

    let anchor_ok = anchor::verify(&anchor::anchor_path(data_dir), &ledger::ledger_path(data_dir))
        .map(|r| r.ok)
        .unwrap_or(true);

    let disk_pressure = retention::evaluate_disk_pressure(&config.storage.disk_pressure, data_dir)
        .map(|r| format!("{:?}", r.level).to_lowercase())
        .unwrap_or_else(|_| "unknown".to_string());

    let consent_accepted = consent::load_capture_consent(data_dir).accepted;

    let passed = capabilities.iter().filter(|c| c.ok).count() as u32
        + [ledger_ok, anchor_ok, consent_accepted].iter().filter(|b| **b).count() as u32;
    let failed = capabilities.len() as u32 + 3 - passed;

    DoctorReport {
        capabilities,
        ledger_ok,
        anchor_ok,
        disk_pressure,
        consent_accepted,
        passed,
        failed,
    }
}

/// Prints the human-facing matrix. `run(data_dir)` is the CLI entry point;
/// it loads config and discovers plugins itself so callers only need a
/// data directory.
pub fn run(data_dir: &Path) -> anyhow::Result<DoctorReport> {
    let config = Config::load(&Config::default_path(data_dir))?;
    let manager = PluginManager::discover(&config.plugins.search_paths.iter().map(std::path::PathBuf::from).collect::<Vec<_>>())?
        .with_diagnostics(data_dir);
    let report = check(data_dir, &config, &manager);

    cprintln!();
    cprintln!("{DIM}── autocapture doctor ───────────────────────────{RESET}");
    cprintln!();

    for c in &report.capabilities {
        if c.ok {
            cprintln!("  {GREEN}✓{RESET}  {} — {}", c.capability, c.detail);
        } else {
            cprintln!("  {RED}✗{RESET}  {} — {}", c.capability, c.detail);
        }
    }

    cprintln!();
    if report.ledger_ok {
        cprintln!("  {GREEN}✓{RESET}  ledger hash chain intact");
    } else {
        cprintln!("  {RED}✗{RESET}  ledger hash chain broken or unreadable");
    }
    if report.anchor_ok {
        cprintln!("  {GREEN}✓{RESET}  anchor chain consistent with ledger");
    } else {
        cprintln!("  {RED}✗{RESET}  anchor chain does not match ledger window(s)");
    }
    if report.consent_accepted {
        cprintln!("  {GREEN}✓{RESET}  capture consent accepted");
    } else {
        cprintln!("  {DIM}-{RESET}  capture consent not accepted (capture gate will fail closed)");
    }
    cprintln!("  {CYAN}i{RESET}  disk pressure: {}", report.disk_pressure);

    if let Ok(meta) = std::fs::metadata(ledger::ledger_path(data_dir)) {
        cprintln!("  {CYAN}i{RESET}  ledger size: {}", format_size(meta.len()));
    }

    cprintln!();
    cprintln!(
        "  {BOLD}{}{RESET} passed  {}{}{} failed",
        report.passed,
        if report.failed > 0 { RED } else { DIM },
        report.failed,
        RESET
    );
    cprintln!();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_ledger_and_consent_fail_those_checks() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let manager = PluginManager::discover(&[]).unwrap();
        let report = check(dir.path(), &config, &manager);
        assert!(report.ledger_ok, "empty/missing ledger verifies as ok (zero entries)");
        assert!(!report.consent_accepted);
        assert!(report.capabilities.iter().all(|c| !c.ok), "no plugins discovered");
    }

    #[test]
    fn accepted_consent_and_clean_ledger_pass() {
        let dir = tempdir().unwrap();
        consent::accept_capture_consent(dir.path()).unwrap();
        ledger::append(&ledger::ledger_path(dir.path()), "run_start", vec![], vec![], serde_json::json!({}))
            .unwrap();
        let config = Config::default();
        let manager = PluginManager::discover(&[]).unwrap();
        let report = check(dir.path(), &config, &manager);
        assert!(report.ledger_ok);
        assert!(report.consent_accepted);
    }

    #[test]
    fn all_twelve_capabilities_are_checked() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let manager = PluginManager::discover(&[]).unwrap();
        let report = check(dir.path(), &config, &manager);
        assert_eq!(report.capabilities.len(), 12);
    }
}
