//! Ordered gate-step executor. Grounded on `tools/release_gate.py`'s
//! subprocess-chain-with-strict-status semantics.

use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::matrix::{check_matrix_shape, scan_strict_status};
use crate::logging::DiagnosticLogger;

const STDOUT_TRUNCATE_BYTES: usize = 8192;

#[derive(Debug, Clone)]
pub struct GateStep {
    pub name: String,
    pub command: Vec<String>,
    pub timeout: Duration,
    pub artifact_path: Option<PathBuf>,
    pub strict_status: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateStepResult {
    pub name: String,
    pub ok: bool,
    pub returncode: i32,
    pub detail: String,
    pub stdout_json: Option<Value>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub steps: Vec<GateStepResult>,
    pub ok: bool,
}

fn parse_trailing_json(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim_end();
    let mut search_from = trimmed.len();
    while let Some(start) = trimmed[..search_from].rfind('{') {
        if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..]) {
            return Some(v);
        }
        search_from = start;
        if search_from == 0 {
            break;
        }
    }
    None
}

fn spawn_reader(mut stream: impl Read + Send + 'static) -> Arc<Mutex<Vec<u8>>> {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let buf2 = Arc::clone(&buf);
    std::thread::spawn(move || {
        let mut tmp = Vec::new();
        let _ = stream.read_to_end(&mut tmp);
        *buf2.lock().expect("reader mutex poisoned") = tmp;
    });
    buf
}

fn run_one(step: &GateStep) -> GateStepResult {
    let start = Instant::now();

    if step.command.is_empty() {
        return GateStepResult {
            name: step.name.clone(),
            ok: false,
            returncode: -1,
            detail: "empty_command".to_string(),
            stdout_json: None,
            duration_ms: 0,
        };
    }

    let mut child = match Command::new(&step.command[0])
        .args(&step.command[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            return GateStepResult {
                name: step.name.clone(),
                ok: false,
                returncode: -1,
                detail: format!("spawn_failed: {e}"),
                stdout_json: None,
                duration_ms: start.elapsed().as_millis() as u64,
            }
        }
    };

    let stdout_buf = child.stdout.take().map(spawn_reader);
    let stderr_buf = child.stderr.take().map(spawn_reader);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if start.elapsed() > step.timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => break None,
        }
    };

    let stdout_bytes = stdout_buf
        .map(|b| b.lock().expect("stdout mutex poisoned").clone())
        .unwrap_or_default();
    let stdout_text = String::from_utf8_lossy(&stdout_bytes);
    let _ = stderr_buf; // captured for completeness, not surfaced in the report

    let duration_ms = start.elapsed().as_millis() as u64;

    let returncode = match status {
        Some(s) => s.code().unwrap_or(-1),
        None => 124,
    };

    if returncode == 124 {
        let truncated: String = stdout_text.chars().take(STDOUT_TRUNCATE_BYTES).collect();
        return GateStepResult {
            name: step.name.clone(),
            ok: false,
            returncode,
            detail: format!("timeout; stdout (truncated): {truncated}"),
            stdout_json: None,
            duration_ms,
        };
    }

    let stdout_json = parse_trailing_json(&stdout_text);
    let artifact_json = step
        .artifact_path
        .as_ref()
        .and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|text| serde_json::from_str::<Value>(&text).ok());

    if returncode != 0 {
        return GateStepResult {
            name: step.name.clone(),
            ok: false,
            returncode,
            detail: "nonzero_exit".to_string(),
            stdout_json,
            duration_ms,
        };
    }

    if step.strict_status {
        for candidate in [&stdout_json, &artifact_json].into_iter().flatten() {
            let failures = scan_strict_status(candidate);
            if !failures.is_empty() {
                return GateStepResult {
                    name: step.name.clone(),
                    ok: false,
                    returncode,
                    detail: format!("strict_status_violation: {}", failures.join(", ")),
                    stdout_json,
                    duration_ms,
                };
            }
            if let Err(violations) = check_matrix_shape(candidate) {
                return GateStepResult {
                    name: step.name.clone(),
                    ok: false,
                    returncode,
                    detail: format!("matrix_shape_violation: {}", violations.join(", ")),
                    stdout_json,
                    duration_ms,
                };
            }
        }
    }

    GateStepResult {
        name: step.name.clone(),
        ok: true,
        returncode,
        detail: "pass".to_string(),
        stdout_json,
        duration_ms,
    }
}

/// Runs `steps` in order, stopping at the first failure. `logger`, when
/// given, receives one `gate.step` diagnostic event per step (best effort —
/// a logging failure never fails the gate run itself).
pub fn run_gates(steps: &[GateStep], logger: Option<&DiagnosticLogger>) -> GateReport {
    let mut results = Vec::new();
    let mut overall_ok = true;
    for step in steps {
        let result = run_one(step);
        let ok = result.ok;
        if let Some(logger) = logger {
            let _ = logger.event(
                "gate.step",
                &step.name,
                serde_json::json!({"ok": result.ok, "returncode": result.returncode, "duration_ms": result.duration_ms}),
            );
        }
        results.push(result);
        if !ok {
            overall_ok = false;
            break;
        }
    }
    GateReport { steps: results, ok: overall_ok }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, shell: &str, strict: bool) -> GateStep {
        GateStep {
            name: name.to_string(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), shell.to_string()],
            timeout: Duration::from_secs(5),
            artifact_path: None,
            strict_status: strict,
        }
    }

    #[test]
    fn passing_step_reports_ok() {
        let report = run_gates(&[step("echo", "echo '{\"ok\": true}'", true)], None);
        assert!(report.ok);
        assert_eq!(report.steps[0].returncode, 0);
    }

    #[test]
    fn nonzero_exit_fails_the_step() {
        let report = run_gates(&[step("fail", "exit 3", false)], None);
        assert!(!report.ok);
        assert_eq!(report.steps[0].returncode, 3);
    }

    #[test]
    fn strict_mode_fails_on_embedded_ok_false() {
        let report = run_gates(&[step("strict", "echo 'preamble text {\"ok\": false}'", true)], None);
        assert!(!report.ok);
        assert!(report.steps[0].detail.contains("strict_status_violation"));
    }

    #[test]
    fn stops_at_first_failure() {
        let report = run_gates(&[step("first", "exit 1", false), step("second", "echo ok", false)], None);
        assert_eq!(report.steps.len(), 1);
    }

    #[test]
    fn timeout_yields_returncode_124() {
        let report = run_gates(&[GateStep {
            name: "slow".to_string(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), "sleep 5".to_string()],
            timeout: Duration::from_millis(50),
            artifact_path: None,
            strict_status: false,
        }], None);
        assert_eq!(report.steps[0].returncode, 124);
    }

    #[test]
    fn logger_receives_one_event_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DiagnosticLogger::new(dir.path(), "gates");
        run_gates(&[step("echo", "echo '{\"ok\": true}'", true)], Some(&logger));
        let events = logger.read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], serde_json::json!("gate.step"));
    }
}
