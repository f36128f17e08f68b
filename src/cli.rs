//! CLI subcommand handlers, per spec.md §6.3. Argument parsing keeps the
//! teacher's flat `--flag value` style (`get_flag`/`filter_flags`) rather
//! than pulling in `clap`, since the teacher never used one either.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::journal::JournalEvent;
use crate::output::{cprintln, GREEN, RED, RESET};
use crate::plugins::kinds::{is_known_kind, REQUIRED_KINDS};
use crate::plugins::manager::PluginManager;
use crate::query::{self, QueryEngineInput};
use crate::store::media::{FsMediaStore, MediaStore};
use crate::{anchor, doctor, gates, journal, ledger};

pub fn get_flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

pub fn filter_flags(args: &[String], names: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for a in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if names.contains(&a.as_str()) {
            skip_next = true;
            continue;
        }
        out.push(a.clone());
    }
    out
}

/// Exit codes per spec.md §6.3: 0=pass, 1=fail, 2=fatal/missing-prereq,
/// 124=timeout.
pub const EXIT_PASS: i32 = 0;
pub const EXIT_FAIL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

fn data_dir_from_flags(args: &[String]) -> PathBuf {
    get_flag(args, "--data-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".autocapture"))
}

pub fn verify_ledger(args: &[String]) -> Result<i32> {
    let path = get_flag(args, "--path")
        .map(PathBuf::from)
        .unwrap_or_else(|| ledger::ledger_path(&data_dir_from_flags(args)));
    if !path.exists() {
        println!("{{\"ok\":true,\"entries_checked\":0,\"detail\":\"no ledger present\"}}");
        return Ok(EXIT_PASS);
    }
    let report = ledger::verify(&path)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(if report.ok { EXIT_PASS } else { EXIT_FATAL })
}

pub fn verify_anchors(args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let anchor_path = get_flag(args, "--path")
        .map(PathBuf::from)
        .unwrap_or_else(|| anchor::anchor_path(&data_dir));
    if !anchor_path.exists() {
        println!("{{\"ok\":true,\"anchors_checked\":0,\"detail\":\"no anchors present\"}}");
        return Ok(EXIT_PASS);
    }
    let report = anchor::verify(&anchor_path, &ledger::ledger_path(&data_dir))?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(if report.ok { EXIT_PASS } else { EXIT_FATAL })
}

/// Asserts every citation recorded in `facts/answers.ndjson` resolves to a
/// blob present in the media store. No answers file yet written is not a
/// failure — there is simply no evidence to check.
pub fn verify_evidence(args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let answers_path = data_dir.join("facts").join("answers.ndjson");
    if !answers_path.exists() {
        println!("{{\"ok\":true,\"citations_checked\":0,\"detail\":\"no recorded answers present\"}}");
        return Ok(EXIT_PASS);
    }

    let media = FsMediaStore::new(data_dir.join("media"));
    let mut checked = 0u64;
    let mut missing = Vec::new();

    for line in crate::logstore::read_lines(&answers_path)? {
        let value: serde_json::Value =
            serde_json::from_str(&line).context("parsing answers.ndjson line")?;
        let Some(claims) = value["answer"]["claims"].as_array() else { continue };
        for claim in claims {
            let Some(citations) = claim["citations"].as_array() else { continue };
            for c in citations {
                checked += 1;
                let record_id = c["evidence_id"].as_str().unwrap_or("");
                if !record_id.is_empty() && !media.exists(record_id) {
                    missing.push(record_id.to_string());
                }
            }
        }
    }

    let ok = missing.is_empty();
    println!(
        "{}",
        serde_json::json!({"ok": ok, "citations_checked": checked, "missing": missing})
    );
    Ok(if ok { EXIT_PASS } else { EXIT_FAIL })
}

/// `storage migrate --src --dst [--dry-run] [--no-verify]`: copies every
/// file under `src` into `dst`, sha256-verifying the copy unless
/// `--no-verify` is given. Never removes the source. Ported from
/// `autocapture_nx/storage/migrate.py`.
pub fn storage_migrate(args: &[String]) -> Result<i32> {
    let src = get_flag(args, "--src").context("--src is required")?;
    let dst = get_flag(args, "--dst").context("--dst is required")?;
    let dry_run = has_flag(args, "--dry-run");
    let verify = !has_flag(args, "--no-verify");

    let src = Path::new(&src);
    let dst = Path::new(&dst);
    let mut copied = 0u64;
    let mut verified = 0u64;
    let mut mismatched = Vec::new();

    for entry in walk_files(src)? {
        let rel = entry.strip_prefix(src).unwrap_or(&entry);
        let target = dst.join(rel);
        if dry_run {
            copied += 1;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&entry, &target)
            .with_context(|| format!("copying {} -> {}", entry.display(), target.display()))?;
        copied += 1;

        if verify {
            let src_hash = sha256_file(&entry)?;
            let dst_hash = sha256_file(&target)?;
            verified += 1;
            if src_hash != dst_hash {
                mismatched.push(rel.display().to_string());
            }
        }
    }

    let ok = mismatched.is_empty();
    println!(
        "{}",
        serde_json::json!({"ok": ok, "files_copied": copied, "files_verified": verified, "mismatched": mismatched, "dry_run": dry_run})
    );
    Ok(if ok { EXIT_PASS } else { EXIT_FAIL })
}

fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn sha256_file(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// `storage forecast [--data-dir]`: linear-trend days-remaining estimate
/// from `disk.pressure` journal events. Ported from
/// `autocapture_nx/storage/forecast.py`.
pub fn storage_forecast(args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let journal_path = journal::journal_path(&data_dir);
    if !journal_path.exists() {
        println!("{{\"ok\":true,\"samples\":0,\"detail\":\"no journal present\"}}");
        return Ok(EXIT_PASS);
    }

    let events = journal::read_by_type(&journal_path, "disk.pressure")?;
    let samples: Vec<(f64, f64)> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.payload["free_bytes"].as_f64().map(|free| (i as f64, free)))
        .collect();

    if samples.len() < 2 {
        println!("{{\"ok\":true,\"samples\":{},\"days_remaining\":null}}", samples.len());
        return Ok(EXIT_PASS);
    }

    let (slope, intercept) = linear_fit(&samples);
    let latest_x = samples.last().unwrap().0;
    let latest_y = samples.last().unwrap().1;
    let days_remaining = if slope < 0.0 {
        Some((-latest_y / slope).max(0.0))
    } else {
        None
    };

    println!(
        "{}",
        serde_json::json!({
            "ok": true,
            "samples": samples.len(),
            "slope_bytes_per_sample": slope,
            "intercept": intercept,
            "latest_free_bytes": latest_y,
            "latest_index": latest_x,
            "days_remaining": days_remaining,
        })
    );
    Ok(EXIT_PASS)
}

/// Ordinary least squares over `(x, y)` pairs.
fn linear_fit(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return (0.0, sum_y / n);
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    (slope, intercept)
}

pub fn plugins_list(args: &[String], json: bool) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let config = Config::load(&Config::default_path(&data_dir))?;
    let roots: Vec<PathBuf> = config.plugins.search_paths.iter().map(PathBuf::from).collect();
    let manager = PluginManager::discover(&roots)?.with_diagnostics(&data_dir);
    let enabled = manager.enabled_plugin_ids(&config.plugins);

    if json {
        let rows: Vec<_> = manager
            .manifests()
            .iter()
            .map(|m| {
                serde_json::json!({
                    "plugin_id": m.manifest.plugin_id,
                    "version": m.manifest.version,
                    "enabled": enabled.contains(&m.manifest.plugin_id),
                    "extensions": m.manifest.extensions.iter().map(|e| &e.kind).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&rows)?);
    } else {
        for m in manager.manifests() {
            let is_enabled = enabled.contains(&m.manifest.plugin_id);
            let mark = if is_enabled { GREEN } else { RED };
            let dot = if is_enabled { "●" } else { "○" };
            cprintln!("  {mark}{dot}{RESET}  {} (v{})", m.manifest.plugin_id, m.manifest.version);
        }
    }
    Ok(EXIT_PASS)
}

/// `plugins verify-defaults`: every kind in `REQUIRED_KINDS` must have at
/// least one enabled provider, else exit 2 (missing prerequisite).
pub fn plugins_verify_defaults(args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let config = Config::load(&Config::default_path(&data_dir))?;
    let roots: Vec<PathBuf> = config.plugins.search_paths.iter().map(PathBuf::from).collect();
    let manager = PluginManager::discover(&roots)?.with_diagnostics(&data_dir);
    let enabled = manager.enabled_plugin_ids(&config.plugins);

    let mut missing = Vec::new();
    for kind in REQUIRED_KINDS {
        debug_assert!(is_known_kind(kind));
        let has_provider = manager
            .find_extensions(&config.plugins, kind, None)
            .into_iter()
            .any(|slot| enabled.contains(&slot.plugin_id));
        if !has_provider {
            missing.push(kind.to_string());
        }
    }

    let ok = missing.is_empty();
    println!("{}", serde_json::json!({"ok": ok, "missing_required_kinds": missing}));
    Ok(if ok { EXIT_PASS } else { EXIT_FATAL })
}

pub fn codex_validate(args: &[String]) -> Result<i32> {
    let spec_path = get_flag(args, "--spec").context("--spec is required")?;
    let project_root = get_flag(args, "--project-root")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let spec = gates::codex::load_spec(Path::new(&spec_path))?;
    let report = gates::codex::validate(&spec, &project_root);
    println!("{}", serde_json::to_string(&report)?);
    Ok(if report.failed() == 0 { EXIT_PASS } else { EXIT_FAIL })
}

pub fn run_doctor(args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let report = doctor::run(&data_dir)?;
    Ok(if report.failed == 0 { EXIT_PASS } else { EXIT_FAIL })
}

/// `research run`: a one-shot hand-off point for an external collaborator
/// process. This core does not implement the collaborator itself (per
/// spec.md's Non-goals on network-bound retrieval); it only validates the
/// data directory is in a runnable state and reports so, matching the
/// deterministic-JSON-to-stdout contract the gate runner expects.
pub fn research_run(args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let config_path = Config::default_path(&data_dir);
    match Config::load(&config_path) {
        Ok(_) => {
            println!(
                "{}",
                serde_json::json!({"ok": true, "status": "ready", "data_dir": data_dir.display().to_string()})
            );
            Ok(EXIT_PASS)
        }
        Err(e) => {
            println!("{}", serde_json::json!({"ok": false, "status": "error", "detail": e.to_string()}));
            Ok(EXIT_FATAL)
        }
    }
}

/// `query "<text>" [--data-dir]`: runs the lexical query engine over every
/// ingested session under `<data_dir>/ingest/` and prints the
/// `{ok, error, answer, processing}` payload to stdout, appending it to
/// `facts/answers.ndjson` so `verify evidence` has something to check.
/// `ok` is `false` on the fast-fail (`query_capability_missing` /
/// `kernel_boot_failed`) paths, matching the gate runner's strict-status scan.
pub fn run_query(text: &str, args: &[String]) -> Result<i32> {
    let data_dir = data_dir_from_flags(args);
    let config = Config::load(&Config::default_path(&data_dir))?;
    let roots: Vec<PathBuf> = config.plugins.search_paths.iter().map(PathBuf::from).collect();
    let manager = PluginManager::discover(&roots)?.with_diagnostics(&data_dir);
    let enabled = manager.enabled_plugin_ids(&config.plugins);

    let mut capabilities = std::collections::BTreeSet::new();
    for kind in crate::query::engine::REQUIRED_CAPABILITIES {
        let has_provider = manager
            .find_extensions(&config.plugins, kind, None)
            .into_iter()
            .any(|slot| enabled.contains(&slot.plugin_id));
        if has_provider {
            capabilities.insert(kind.to_string());
        }
    }

    let sessions = query::load_all_sessions(&data_dir.join("ingest"))?;
    let result = query::run_query(QueryEngineInput {
        query: text.to_string(),
        sessions: &sessions,
        capabilities: &capabilities,
        top_k: config.query.top_k as usize,
        timeout: std::time::Duration::from_millis(config.query.timeout_ms),
        kernel_booted: true,
    });

    let payload = serde_json::to_value(&result)?;
    println!("{}", serde_json::to_string(&payload)?);

    let facts_dir = data_dir.join("facts");
    std::fs::create_dir_all(&facts_dir)?;
    crate::atomic::append_ndjson_line(&facts_dir.join("answers.ndjson"), &payload)?;

    Ok(if result.answer.state == "ok" { EXIT_PASS } else { EXIT_FAIL })
}

pub fn journal_events_by_type(data_dir: &Path, event_type: &str) -> Result<Vec<JournalEvent>> {
    journal::read_by_type(&journal::journal_path(data_dir), event_type)
}

pub fn print_help() {
    cprintln!("autocapture — local-first capture, ingest, and evidence-query core");
    cprintln!();
    cprintln!("USAGE:");
    cprintln!("  autocapture <command> [flags]");
    cprintln!();
    cprintln!("COMMANDS:");
    cprintln!("  run | pause                          toggle the capture run state");
    cprintln!("  doctor [--data-dir]                  capability + health matrix");
    cprintln!("  verify ledger|anchors|evidence        integrity checks (exit 0/1/2)");
    cprintln!("  storage migrate --src --dst           copy + sha256-verify (never deletes)");
    cprintln!("  storage forecast [--data-dir]         disk-pressure trend forecast");
    cprintln!("  plugins list [--json] | verify-defaults");
    cprintln!("  codex validate --spec <path>           run a requirement validator manifest");
    cprintln!("  research run                          one-shot collaborator hand-off check");
    cprintln!("  query \"<text>\" [--data-dir]           run the lexical query engine");
    cprintln!();
    cprintln!("  --no-color     disable ANSI output");
    cprintln!("  --help, -h     show this message");
    cprintln!("  --version, -V  show the version");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_flag_reads_value_after_name() {
        let args = vec!["--path".to_string(), "/tmp/x".to_string()];
        assert_eq!(get_flag(&args, "--path"), Some("/tmp/x".to_string()));
        assert_eq!(get_flag(&args, "--missing"), None);
    }

    #[test]
    fn filter_flags_drops_name_and_value() {
        let args = vec!["--format".to_string(), "csv".to_string(), "--keep".to_string()];
        assert_eq!(filter_flags(&args, &["--format"]), vec!["--keep".to_string()]);
    }

    #[test]
    fn linear_fit_recovers_exact_line() {
        let points = vec![(0.0, 10.0), (1.0, 8.0), (2.0, 6.0)];
        let (slope, intercept) = linear_fit(&points);
        assert!((slope + 2.0).abs() < 1e-9);
        assert!((intercept - 10.0).abs() < 1e-9);
    }

    #[test]
    fn verify_ledger_on_missing_path_passes_with_zero_entries() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["--data-dir".to_string(), dir.path().display().to_string()];
        let code = verify_ledger(&args).unwrap();
        assert_eq!(code, EXIT_PASS);
    }

    #[test]
    fn storage_migrate_dry_run_copies_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello").unwrap();
        let args = vec![
            "--src".to_string(),
            src.path().display().to_string(),
            "--dst".to_string(),
            dst.path().display().to_string(),
            "--dry-run".to_string(),
        ];
        let code = storage_migrate(&args).unwrap();
        assert_eq!(code, EXIT_PASS);
        assert!(!dst.path().join("a.txt").exists());
    }

    #[test]
    fn run_query_finds_match_and_records_answer() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path();
        let session_dir = data_dir.join("ingest").join("session_001");
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(
            session_dir.join("elements.ndjson"),
            "{\"row_idx\":0,\"frame_index\":0,\"element_id\":\"e1\",\"text\":\"Inbox\"}\n",
        )
        .unwrap();
        let mut index = crate::lexical_index::LexicalIndex::new();
        index.add_row(0, "inbox");
        std::fs::write(
            session_dir.join("lexical_index.json"),
            serde_json::to_vec(&index).unwrap(),
        )
        .unwrap();

        let args = vec!["--data-dir".to_string(), data_dir.display().to_string()];
        let code = run_query("inbox", &args).unwrap();
        assert_eq!(code, EXIT_FAIL, "no plugins discovered, so capabilities are missing");
        assert!(data_dir.join("facts").join("answers.ndjson").exists());
    }

    #[test]
    fn storage_migrate_verifies_copy() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"hello").unwrap();
        let args = vec![
            "--src".to_string(),
            src.path().display().to_string(),
            "--dst".to_string(),
            dst.path().display().to_string(),
        ];
        let code = storage_migrate(&args).unwrap();
        assert_eq!(code, EXIT_PASS);
        assert!(dst.path().join("a.txt").exists());
    }
}
