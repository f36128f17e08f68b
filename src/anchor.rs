//! Periodic Merkle-root anchors over ledger windows.
//!
//! Open question from spec.md §9: the Merkle arity is unspecified. We use a
//! binary tree (arity 2), duplicating the last leaf when a level has an odd
//! node count (the common Bitcoin-style convention) — recorded in
//! DESIGN.md. Anchors are written to a separate append-only log so the
//! ledger itself never back-references anchors.

use anyhow::{Context, Result};
use std::path::Path;

use crate::canon;
use crate::logstore;
use crate::models::{Anchor, LedgerEntry};
use crate::timebase;

pub fn anchor_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("anchor.ndjson")
}

/// Merkle root of `leaves` (each a hex digest). Empty input yields the
/// hash of an empty string, matching `sha256("")`.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return canon::hash_bytes(b"");
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0;
        while i < level.len() {
            let left = &level[i];
            let right = if i + 1 < level.len() {
                &level[i + 1]
            } else {
                left
            };
            let combined = format!("{left}{right}");
            next.push(canon::hash_bytes(combined.as_bytes()));
            i += 2;
        }
        level = next;
    }
    level.into_iter().next().unwrap()
}

/// Build and append an anchor over ledger entries `[start_seq, end_seq)`
/// (0-indexed line numbers within the ledger file).
pub fn write_anchor(
    anchor_log: &Path,
    ledger_log: &Path,
    window_start_seq: u64,
    window_end_seq: u64,
    signature: Option<String>,
) -> Result<Anchor> {
    let lines = logstore::read_lines(ledger_log)?;
    let start = window_start_seq as usize;
    let end = (window_end_seq as usize).min(lines.len());
    let window = &lines[start.min(end)..end];

    let leaves: Vec<String> = window
        .iter()
        .map(|line| {
            let entry: LedgerEntry = serde_json::from_str(line).context("parsing ledger entry")?;
            Ok::<_, anyhow::Error>(entry.this_hash)
        })
        .collect::<Result<_>>()?;

    let root_hash = merkle_root(&leaves);
    let anchor = Anchor {
        root_hash,
        signature,
        ts_utc: timebase::utc_now_z(),
        window_start_seq,
        window_end_seq,
    };
    let line = serde_json::to_string(&anchor).context("serializing anchor")?;
    logstore::append_line(anchor_log, &line)?;
    Ok(anchor)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnchorVerifyReport {
    pub ok: bool,
    pub anchors_checked: usize,
    pub failed_at: Option<usize>,
}

/// Re-derive each anchor's root from the corresponding ledger window and
/// compare. Does not check signatures unless a keyring verifier is
/// supplied by the caller (kept out of this module to avoid a keyring
/// dependency cycle).
pub fn verify(anchor_log: &Path, ledger_log: &Path) -> Result<AnchorVerifyReport> {
    let anchors = logstore::read_lines(anchor_log)?;
    let ledger_lines = logstore::read_lines(ledger_log)?;

    for (idx, line) in anchors.iter().enumerate() {
        let anchor: Anchor = serde_json::from_str(line).context("parsing anchor")?;
        let start = anchor.window_start_seq as usize;
        let end = (anchor.window_end_seq as usize).min(ledger_lines.len());
        if start > end {
            return Ok(AnchorVerifyReport {
                ok: false,
                anchors_checked: idx,
                failed_at: Some(idx),
            });
        }
        let leaves: Vec<String> = ledger_lines[start..end]
            .iter()
            .map(|l| {
                let entry: LedgerEntry = serde_json::from_str(l)?;
                Ok::<_, serde_json::Error>(entry.this_hash)
            })
            .collect::<std::result::Result<_, _>>()
            .context("parsing ledger window")?;
        let recomputed = merkle_root(&leaves);
        if recomputed != anchor.root_hash {
            return Ok(AnchorVerifyReport {
                ok: false,
                anchors_checked: idx,
                failed_at: Some(idx),
            });
        }
    }

    Ok(AnchorVerifyReport {
        ok: true,
        anchors_checked: anchors.len(),
        failed_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn merkle_root_is_deterministic() {
        let leaves = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let r1 = merkle_root(&leaves);
        let r2 = merkle_root(&leaves);
        assert_eq!(r1, r2);
    }

    #[test]
    fn merkle_root_changes_with_leaf_order() {
        let a = merkle_root(&["x".to_string(), "y".to_string()]);
        let b = merkle_root(&["y".to_string(), "x".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn anchor_over_ledger_window_verifies() {
        let dir = tempdir().unwrap();
        let ledger_log = dir.path().join("ledger.ndjson");
        let anchor_log = dir.path().join("anchor.ndjson");
        crate::ledger::append(&ledger_log, "s", vec![], vec![], serde_json::json!({"n":1})).unwrap();
        crate::ledger::append(&ledger_log, "s", vec![], vec![], serde_json::json!({"n":2})).unwrap();
        write_anchor(&anchor_log, &ledger_log, 0, 2, None).unwrap();
        let report = verify(&anchor_log, &ledger_log).unwrap();
        assert!(report.ok);
    }

    #[test]
    fn tampered_ledger_breaks_anchor_verification() {
        let dir = tempdir().unwrap();
        let ledger_log = dir.path().join("ledger.ndjson");
        let anchor_log = dir.path().join("anchor.ndjson");
        crate::ledger::append(&ledger_log, "s", vec![], vec![], serde_json::json!({"n":1})).unwrap();
        write_anchor(&anchor_log, &ledger_log, 0, 1, None).unwrap();
        let content = std::fs::read_to_string(&ledger_log).unwrap().replacen("\"n\":1", "\"n\":2", 1);
        std::fs::write(&ledger_log, content).unwrap();
        let report = verify(&anchor_log, &ledger_log).unwrap();
        assert!(!report.ok);
    }
}
