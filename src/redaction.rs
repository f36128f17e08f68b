//! Secret/token redaction for log and diagnostics output. Ported from
//! `autocapture_nx/kernel/redaction.py`. The raw-first local store is never
//! redacted; this applies only at export/egress/log boundaries.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

struct Patterns {
    openai_sk: Regex,
    aws_access_key: Regex,
    bearer: Regex,
    private_key: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        openai_sk: Regex::new(r"\bsk-[A-Za-z0-9]{20,}\b").unwrap(),
        aws_access_key: Regex::new(r"\bAKIA[0-9A-Z]{16}\b").unwrap(),
        bearer: Regex::new(r"\b[Bb]earer\s+[A-Za-z0-9\-._~+/]+=*").unwrap(),
        private_key: Regex::new(r"-----BEGIN [A-Z0-9 ]*PRIVATE KEY-----").unwrap(),
    })
}

const SENSITIVE_KEYS: &[&str] = &[
    "openai_api_key",
    "api_key",
    "access_token",
    "refresh_token",
    "client_secret",
    "authorization",
];

pub fn redact_text(value: &str) -> String {
    let p = patterns();
    let text = p.openai_sk.replace_all(value, "[REDACTED]");
    let text = p.aws_access_key.replace_all(&text, "[REDACTED]");
    let text = p.bearer.replace_all(&text, "[REDACTED]");
    let text = p.private_key.replace_all(&text, "[REDACTED]");
    text.into_owned()
}

/// Recursively redacts string values and sensitive object keys within a
/// JSON value, leaving numbers/bools/null untouched.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if SENSITIVE_KEYS.contains(&k.to_lowercase().as_str()) {
                    out.insert(k.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(k.clone(), redact_value(v));
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_openai_style_key() {
        let text = redact_text("key=sk-abcdefghijklmnopqrstuvwxyz12");
        assert!(!text.contains("sk-abc"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn redacts_bearer_token() {
        let text = redact_text("Authorization: Bearer abc.def-ghi");
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn leaves_non_secret_text_alone() {
        assert_eq!(redact_text("token_format=jwt"), "token_format=jwt");
    }

    #[test]
    fn redacts_sensitive_object_key_regardless_of_value_shape() {
        let value = json!({"api_key": "plain-looking-value", "note": "keep me"});
        let redacted = redact_value(&value);
        assert_eq!(redacted["api_key"], json!("[REDACTED]"));
        assert_eq!(redacted["note"], json!("keep me"));
    }

    #[test]
    fn sensitive_key_match_is_case_insensitive() {
        let value = json!({"API_KEY": "secret"});
        let redacted = redact_value(&value);
        assert_eq!(redacted["API_KEY"], json!("[REDACTED]"));
    }
}
