//! Answer and trace envelope shapes returned by the query engine.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Citation, QueryTrace};

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswerDisplay {
    pub summary: String,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryClaim {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub state: String,
    pub display: QueryAnswerDisplay,
    pub claims: Vec<QueryClaim>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryExtraction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryProcessing {
    pub query_trace: QueryTrace,
    pub attribution: BTreeMap<String, u32>,
    pub extraction: QueryExtraction,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub answer: QueryAnswer,
    pub processing: QueryProcessing,
}

/// Deterministic fast-fail payload for missing capabilities or a failed
/// kernel boot. Per spec.md §4.17, returned in ≤500ms and never raised.
/// Shape matches the original's `{ok:false, error, answer:{state:"degraded"},
/// processing:{extraction:{blocked_reason}, query_trace:{error}}}` envelope.
pub fn degraded_result(state: &str, query: &str, missing_capabilities: Vec<String>) -> QueryResult {
    let query_trace = QueryTrace {
        query_run_id: uuid::Uuid::new_v4().to_string(),
        query: query.to_string(),
        method: "lexical".to_string(),
        winner: None,
        answer_state: state.to_string(),
        providers: Vec::new(),
        handoffs: Vec::new(),
        stage_ms: serde_json::json!({}),
        missing_capabilities,
        error: Some(state.to_string()),
    };
    QueryResult {
        ok: false,
        error: Some(state.to_string()),
        answer: QueryAnswer {
            state: "degraded".to_string(),
            display: QueryAnswerDisplay {
                summary: state.to_string(),
                bullets: Vec::new(),
            },
            claims: Vec::new(),
        },
        processing: QueryProcessing {
            query_trace,
            attribution: BTreeMap::new(),
            extraction: QueryExtraction {
                blocked_reason: Some(state.to_string()),
            },
        },
    }
}
