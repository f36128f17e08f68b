//! Query engine: normalize → lexical search → provider arbitration → trace
//! emission. Per spec.md §4.17.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::lexical_index::{tokenize, LexicalIndex};
use crate::models::{Handoff, ProviderContribution, QueryTrace};

use super::providers::lexical_provider_output;
use super::trace::{degraded_result, QueryAnswer, QueryAnswerDisplay, QueryClaim, QueryProcessing, QueryResult};

/// Capabilities the lexical query path requires to produce a non-degraded
/// answer, per spec.md §4.17's failure model.
pub const REQUIRED_CAPABILITIES: &[&str] = &["storage.metadata", "retrieval.strategy"];

#[derive(Debug, Clone)]
pub struct ElementRowRef {
    pub row_idx: u64,
    pub frame_index: u64,
    pub element_id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SessionIndex {
    pub session_id: String,
    pub index: LexicalIndex,
    pub rows: Vec<ElementRowRef>,
}

#[derive(Debug, Clone)]
pub struct RankedRow {
    pub session_id: String,
    pub frame_index: u64,
    pub row_idx: u64,
    pub element_id: String,
    pub text: String,
    pub score: u64,
}

pub struct QueryEngineInput<'a> {
    pub query: String,
    pub sessions: &'a [SessionIndex],
    pub capabilities: &'a BTreeSet<String>,
    pub top_k: usize,
    pub timeout: Duration,
    pub kernel_booted: bool,
}

fn rank(sessions: &[SessionIndex], tokens: &[String], top_k: usize) -> Vec<RankedRow> {
    let mut rows = Vec::new();
    for session in sessions {
        let scores = session.index.score(tokens);
        for (row_idx, score) in scores {
            if let Some(row) = session.rows.iter().find(|r| r.row_idx == row_idx) {
                rows.push(RankedRow {
                    session_id: session.session_id.clone(),
                    frame_index: row.frame_index,
                    row_idx,
                    element_id: row.element_id.clone(),
                    text: row.text.clone(),
                    score,
                });
            }
        }
    }
    rows.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.session_id.cmp(&b.session_id))
            .then(a.frame_index.cmp(&b.frame_index))
            .then(a.row_idx.cmp(&b.row_idx))
    });
    rows.truncate(top_k);
    rows
}

/// Loads one session's `SessionIndex` from an ingest output directory
/// (`<ingest_root>/<session_id>/{elements.ndjson,lexical_index.json}`),
/// the layout `IngestPipeline::process_session` writes.
pub fn load_session(session_dir: &Path) -> Result<SessionIndex> {
    let session_id = session_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let index_path = session_dir.join("lexical_index.json");
    let index: LexicalIndex = serde_json::from_str(
        &std::fs::read_to_string(&index_path)
            .with_context(|| format!("reading {}", index_path.display()))?,
    )
    .with_context(|| format!("parsing {}", index_path.display()))?;

    let elements_path = session_dir.join("elements.ndjson");
    let mut rows = Vec::new();
    if elements_path.exists() {
        for line in crate::logstore::read_lines(&elements_path)? {
            let value: serde_json::Value = serde_json::from_str(&line)
                .with_context(|| format!("parsing {}", elements_path.display()))?;
            rows.push(ElementRowRef {
                row_idx: value["row_idx"].as_u64().unwrap_or(0),
                frame_index: value["frame_index"].as_u64().unwrap_or(0),
                element_id: value["element_id"].as_str().unwrap_or("").to_string(),
                text: value["text"].as_str().unwrap_or("").to_string(),
            });
        }
    }

    Ok(SessionIndex { session_id, index, rows })
}

/// Loads every session subdirectory of `ingest_root`. Directories missing
/// `lexical_index.json` (not yet ingested, or mid-write) are skipped.
pub fn load_all_sessions(ingest_root: &Path) -> Result<Vec<SessionIndex>> {
    let mut sessions = Vec::new();
    if !ingest_root.exists() {
        return Ok(sessions);
    }
    let mut dirs: Vec<_> = std::fs::read_dir(ingest_root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("lexical_index.json").exists())
        .collect();
    dirs.sort();
    for dir in dirs {
        sessions.push(load_session(&dir)?);
    }
    Ok(sessions)
}

pub fn run_query(input: QueryEngineInput) -> QueryResult {
    let start = Instant::now();

    if !input.kernel_booted {
        return degraded_result("kernel_boot_failed", &input.query, Vec::new());
    }

    let missing: Vec<String> = REQUIRED_CAPABILITIES
        .iter()
        .filter(|c| !input.capabilities.contains(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return degraded_result("query_capability_missing", &input.query, missing);
    }

    let tokens = tokenize(&input.query);
    let ranked = rank(input.sessions, &tokens, input.top_k);
    let provider = lexical_provider_output(&input.query, &ranked);

    let timed_out = start.elapsed() > input.timeout;
    let state = if timed_out {
        "indeterminate"
    } else if !provider.citations.is_empty() {
        "ok"
    } else {
        "indeterminate"
    };

    let contribution_bp = if state == "ok" { 10_000 } else { 0 };
    let providers = vec![ProviderContribution {
        provider_id: provider.provider_id.clone(),
        contribution_bp,
        claim_count: if state == "ok" { 1 } else { 0 },
        citation_count: provider.citations.len() as u32,
        estimated_latency_ms: provider.estimated_latency_ms,
        doc_kinds: vec!["ui_element".to_string()],
    }];

    let query_trace = QueryTrace {
        query_run_id: uuid::Uuid::new_v4().to_string(),
        query: input.query.clone(),
        method: "lexical".to_string(),
        winner: if state == "ok" {
            Some(provider.provider_id.clone())
        } else {
            None
        },
        answer_state: state.to_string(),
        providers: providers.clone(),
        handoffs: vec![Handoff {
            from: "engine".to_string(),
            to: provider.provider_id.clone(),
            latency_ms: provider.estimated_latency_ms,
        }],
        stage_ms: serde_json::json!({ "total_ms": start.elapsed().as_millis() as u64 }),
        missing_capabilities: Vec::new(),
        error: None,
    };

    let mut attribution = std::collections::BTreeMap::new();
    for p in &providers {
        attribution.insert(p.provider_id.clone(), p.contribution_bp);
    }

    QueryResult {
        ok: state == "ok",
        error: None,
        answer: QueryAnswer {
            state: state.to_string(),
            display: QueryAnswerDisplay {
                summary: provider.claim_text.clone(),
                bullets: ranked.iter().map(|r| format!("{}: {}", r.element_id, r.text)).collect(),
            },
            claims: vec![QueryClaim {
                text: provider.claim_text,
                citations: provider.citations,
            }],
        },
        processing: QueryProcessing {
            query_trace,
            attribution,
            extraction: crate::query::trace::QueryExtraction::default(),
        },
    }
}
