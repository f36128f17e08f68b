//! Core data model: the entities of spec.md §3, shared across storage,
//! ingest, and query.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canon;

/// A content-addressed, immutable record. `record_id` is hierarchical
/// (`<run_id>/<record_type>/<seq>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    pub record_type: String,
    pub ts_utc: String,
    pub run_id: String,
    pub payload: Value,
}

impl Record {
    pub fn new(run_id: &str, record_type: &str, seq: u64, ts_utc: String, payload: Value) -> Self {
        let record_id = format!("{run_id}/{record_type}/{seq}");
        Record {
            record_id,
            record_type: record_type.to_string(),
            ts_utc,
            run_id: run_id.to_string(),
            payload,
        }
    }

    /// Content hash over the canonicalized payload, per spec.md §3.
    pub fn content_hash(&self) -> String {
        canon::content_hash(&self.payload)
    }
}

/// An OCR token. `span_id` is a stable hash over `(text, bbox quantized to
/// 1e-6, source)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub text: String,
    pub bbox: [f64; 4],
    pub source: String,
    pub reading_order: u32,
    pub confidence: f64,
}

impl Span {
    pub fn compute_span_id(text: &str, bbox: [f64; 4], source: &str) -> String {
        let quantized: Vec<i64> = bbox.iter().map(|v| canon::quantize_1e6(*v)).collect();
        let value = serde_json::json!({
            "text": text,
            "bbox_q": quantized,
            "source": source,
        });
        canon::content_hash(&value)
    }

    pub fn new(text: String, bbox: [f64; 4], source: String, reading_order: u32, confidence: f64) -> Self {
        let span_id = Self::compute_span_id(&text, bbox, &source);
        Span {
            span_id,
            text,
            bbox,
            source,
            reading_order,
            confidence,
        }
    }
}

/// Normalize pixel `bbox` against image `(w, h)` into `[0, 1]`.
pub fn normalize_bbox(bbox: [f64; 4], w: f64, h: f64) -> [f64; 4] {
    let clamp01 = |v: f64| v.clamp(0.0, 1.0);
    [
        clamp01(bbox[0] / w),
        clamp01(bbox[1] / h),
        clamp01(bbox[2] / w),
        clamp01(bbox[3] / h),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ElementType {
    Window,
    Pane,
    Button,
    Text,
    Icon,
    Input,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiElement {
    pub element_id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub bbox: [i64; 4],
    pub confidence: f64,
    pub label: Option<String>,
    pub text: Option<String>,
    pub parent_id: Option<String>,
}

impl UiElement {
    /// `element_id = sha1(text|bbox).hex[:16]`, per spec.md §4.14.
    pub fn compute_element_id(text: &str, bbox: [i64; 4]) -> String {
        use sha1::{Digest, Sha1};
        let joined = format!("{}|{},{},{},{}", text, bbox[0], bbox[1], bbox[2], bbox[3]);
        let digest = Sha1::digest(joined.as_bytes());
        let hex = hex::encode(digest);
        hex[..16].to_string()
    }
}

/// One `(frame_index, element_id)` pair belonging to a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPoint {
    pub frame_index: u64,
    pub element_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub track_id: String,
    pub points: Vec<TrackPoint>,
}

/// Append-only, hash-chained ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ts_utc: String,
    pub stage: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub payload: Value,
    pub prev_hash: String,
    pub this_hash: String,
}

impl LedgerEntry {
    /// Hash of everything but `this_hash`, per spec.md §4.6.
    pub fn compute_hash(
        ts_utc: &str,
        stage: &str,
        inputs: &[String],
        outputs: &[String],
        payload: &Value,
        prev_hash: &str,
    ) -> String {
        let value = serde_json::json!({
            "ts_utc": ts_utc,
            "stage": stage,
            "inputs": inputs,
            "outputs": outputs,
            "payload": payload,
            "prev_hash": prev_hash,
        });
        canon::content_hash(&value)
    }
}

/// Periodic Merkle root over a ledger window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub root_hash: String,
    pub signature: Option<String>,
    pub ts_utc: String,
    pub window_start_seq: u64,
    pub window_end_seq: u64,
}

/// Operational NDJSON event: disk pressure, capture silence, watchdog, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    pub schema_version: u32,
    pub event_id: String,
    pub sequence: u64,
    pub ts_utc: String,
    pub tzid: String,
    pub offset_minutes: i32,
    pub event_type: String,
    pub payload: Value,
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consent {
    pub schema_version: u32,
    pub accepted: bool,
    pub accepted_ts_utc: Option<String>,
}

impl Default for Consent {
    fn default() -> Self {
        Consent {
            schema_version: 1,
            accepted: false,
            accepted_ts_utc: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPillar {
    pub sandbox: String,
    pub network_access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pillars {
    pub security: SecurityPillar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginExtension {
    pub kind: String,
    pub factory: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub caps: Vec<String>,
    pub pillars: Pillars,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub plugin_id: String,
    pub schema_version: u32,
    pub version: String,
    pub extensions: Vec<PluginExtension>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locator {
    pub kind: String,
    pub record_id: String,
    pub bbox: Option<[i64; 4]>,
    pub frame_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub evidence_id: String,
    pub locator: Locator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderContribution {
    pub provider_id: String,
    pub contribution_bp: u32,
    pub claim_count: u32,
    pub citation_count: u32,
    pub estimated_latency_ms: u64,
    pub doc_kinds: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub from: String,
    pub to: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTrace {
    pub query_run_id: String,
    pub query: String,
    pub method: String,
    pub winner: Option<String>,
    pub answer_state: String,
    pub providers: Vec<ProviderContribution>,
    pub handoffs: Vec<Handoff>,
    pub stage_ms: Value,
    #[serde(default)]
    pub missing_capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_id_is_pure() {
        let a = Span::compute_span_id("hello", [0.1, 0.2, 0.3, 0.4], "ocr");
        let b = Span::compute_span_id("hello", [0.1, 0.2, 0.3, 0.4], "ocr");
        assert_eq!(a, b);
    }

    #[test]
    fn span_id_differs_by_source() {
        let a = Span::compute_span_id("hello", [0.1, 0.2, 0.3, 0.4], "ocr");
        let b = Span::compute_span_id("hello", [0.1, 0.2, 0.3, 0.4], "layout");
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_bbox_clamps_into_unit_range() {
        let out = normalize_bbox([-10.0, 0.0, 2000.0, 50.0], 1000.0, 100.0);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn element_id_is_deterministic() {
        let a = UiElement::compute_element_id("Inbox", [10, 10, 80, 30]);
        let b = UiElement::compute_element_id("Inbox", [10, 10, 80, 30]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn ledger_hash_changes_with_any_field() {
        let h1 =
            LedgerEntry::compute_hash("t0", "stage", &[], &[], &serde_json::json!({}), "prevhash");
        let h2 = LedgerEntry::compute_hash(
            "t0",
            "stage",
            &[],
            &[],
            &serde_json::json!({"a": 1}),
            "prevhash",
        );
        assert_ne!(h1, h2);
    }

    #[test]
    fn default_consent_is_not_accepted() {
        assert!(!Consent::default().accepted);
    }
}
