//! Strict-status JSON scanning and matrix-shaped payload checks, ported
//! from `tools/eval_q40_matrix.py` and `tools/gate_config_matrix.py`.

use serde_json::Value;

const FAILING_STATUSES: &[&str] = &["fail", "error", "warn", "skip"];

/// Recursively scans `value` for `ok: false`, a `status` field in
/// `{fail, error, warn, skip}`, or a non-empty `warnings` array. Returns
/// the list of JSON pointers where a failure was found; empty means pass.
/// A `status` of `"no_data"` is explicitly exempted (the one case an
/// input may attribute to an absence of data rather than a failure).
pub fn scan_strict_status(value: &Value) -> Vec<String> {
    let mut failures = Vec::new();
    scan_strict_status_at(value, "", &mut failures);
    failures
}

fn scan_strict_status_at(value: &Value, path: &str, failures: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Bool(false)) = map.get("ok") {
                failures.push(format!("{path}/ok"));
            }
            if let Some(Value::String(status)) = map.get("status") {
                if status != "no_data" && FAILING_STATUSES.contains(&status.as_str()) {
                    failures.push(format!("{path}/status={status}"));
                }
            }
            if let Some(Value::Array(warnings)) = map.get("warnings") {
                if !warnings.is_empty() {
                    failures.push(format!("{path}/warnings"));
                }
            }
            for (key, child) in map {
                scan_strict_status_at(child, &format!("{path}/{key}"), failures);
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                scan_strict_status_at(item, &format!("{path}[{idx}]"), failures);
            }
        }
        _ => {}
    }
}

/// Matrix-shaped payload invariant, per spec.md §4.19:
/// `matrix_evaluated > 0 ∧ matrix_skipped == 0 ∧ matrix_failed == 0 ∧
/// matrix_evaluated ≤ matrix_total`. Returns `Ok(())` or the list of
/// violated invariants.
pub fn check_matrix_shape(value: &Value) -> Result<(), Vec<String>> {
    let get = |key: &str| value.get(key).and_then(|v| v.as_i64());
    let (evaluated, skipped, failed, total) = match (
        get("matrix_evaluated"),
        get("matrix_skipped"),
        get("matrix_failed"),
        get("matrix_total"),
    ) {
        (Some(e), Some(s), Some(f), Some(t)) => (e, s, f, t),
        _ => return Ok(()), // not a matrix-shaped payload; nothing to enforce
    };

    let mut violations = Vec::new();
    if evaluated <= 0 {
        violations.push("matrix_evaluated must be > 0".to_string());
    }
    if skipped != 0 {
        violations.push(format!("matrix_skipped must be 0, got {skipped}"));
    }
    if failed != 0 {
        violations.push(format!("matrix_failed must be 0, got {failed}"));
    }
    if evaluated > total {
        violations.push(format!("matrix_evaluated ({evaluated}) exceeds matrix_total ({total})"));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
