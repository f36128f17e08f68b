//! Domain error taxonomy shared across the crate.
//!
//! Components return `anyhow::Result<T>` in the teacher's style; at the
//! façade boundary (`facade.rs`, CLI exit codes) errors are downcast/matched
//! into [`ErrorKind`] and serialized as a deterministic JSON payload.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ErrorKind {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("consent required: {0}")]
    ConsentRequired(String),

    #[error("capability missing: {0}")]
    CapabilityMissing(String),

    #[error("disk pressure: {0}")]
    DiskPressure(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("transient io error: {0}")]
    TransientIo(String),

    #[error("plugin load failed: {0}")]
    PluginLoadFailed(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("spool drain skipped: {0}")]
    SpoolDrainSkip(String),
}

impl ErrorKind {
    /// Best-effort classification of an opaque `anyhow::Error` into a
    /// stable kind, for façade-boundary JSON reporting. Errors that don't
    /// match a known pattern fall back to `TransientIo`.
    pub fn classify(err: &anyhow::Error) -> ErrorKind {
        if let Some(k) = err.downcast_ref::<ErrorKind>() {
            return k.clone();
        }
        let msg = err.to_string();
        if msg.contains("consent") {
            ErrorKind::ConsentRequired(msg)
        } else if msg.contains("disk") || msg.contains("pressure") {
            ErrorKind::DiskPressure(msg)
        } else if msg.contains("corrupt") {
            ErrorKind::Corruption(msg)
        } else if msg.contains("already exists") {
            ErrorKind::AlreadyExists(msg)
        } else if msg.contains("plugin") {
            ErrorKind::PluginLoadFailed(msg)
        } else if msg.contains("timed out") || msg.contains("timeout") {
            ErrorKind::Timeout(msg)
        } else if msg.contains("config") {
            ErrorKind::ConfigError(msg)
        } else {
            ErrorKind::TransientIo(msg)
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_consent() {
        let e = anyhow::anyhow!("consent not accepted");
        assert!(matches!(ErrorKind::classify(&e), ErrorKind::ConsentRequired(_)));
    }

    #[test]
    fn classify_falls_back_to_transient_io() {
        let e = anyhow::anyhow!("something unexpected happened");
        assert!(matches!(ErrorKind::classify(&e), ErrorKind::TransientIo(_)));
    }

    #[test]
    fn to_json_has_kind_tag() {
        let k = ErrorKind::DiskPressure("free=1gb".into());
        let v = k.to_json();
        assert_eq!(v.get("kind").unwrap(), "DiskPressure");
    }
}
