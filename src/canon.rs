//! Canonical JSON encoding and content hashing shared by record ids, span
//! ids, OCR cache keys, and the ledger hash chain.
//!
//! Open question from the spec (§9): the exact canonicalization algorithm is
//! unspecified beyond "sorted keys, ASCII encoding". We canonicalize by
//! recursively sorting object keys and serializing with `serde_json` in
//! compact form with non-ASCII characters escaped (`\uXXXX`), matching the
//! `json.dumps(..., sort_keys=True, ensure_ascii=True)` shape the original
//! Python sources use. This choice is recorded in DESIGN.md.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sort object keys so serialization is deterministic.
fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), sort_value(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

fn escape_non_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

/// Canonicalize `value` to its deterministic byte representation: sorted
/// object keys, compact separators, ASCII-escaped non-ASCII text.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let sorted = sort_value(value);
    let compact = serde_json::to_string(&sorted).expect("json values always serialize");
    escape_non_ascii(&compact).into_bytes()
}

/// SHA-256 of the canonical encoding of `value`, as lowercase hex.
pub fn content_hash(value: &Value) -> String {
    let bytes = canonicalize(value);
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// SHA-256 over raw bytes (used for blobs and files), as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Quantize a float bbox coordinate to 1e-6 precision for stable hashing,
/// per spec.md's span id definition.
pub fn quantize_1e6(v: f64) -> i64 {
    (v * 1_000_000.0).round() as i64
}
