//! Alert derivation from journal events. Ported from
//! `autocapture_nx/kernel/alerts.py`.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{AlertRule, AlertsConfig};
use crate::models::JournalEvent;

fn default_rules() -> BTreeMap<String, AlertRule> {
    [
        ("disk.pressure", "warning", "Disk pressure"),
        ("disk.critical", "critical", "Disk critical"),
        ("capture.drop", "warning", "Capture dropped"),
        ("capture.degrade", "warning", "Capture degraded"),
        ("capture.restore", "info", "Capture restored"),
        ("capture.halt_disk", "critical", "CAPTURE HALTED: DISK LOW"),
        ("capture.backend_fallback", "warning", "Capture backend fallback"),
        ("capture.silence", "critical", "Capture silent while active"),
        ("processing.watchdog.stalled", "critical", "Processing watchdog stalled"),
        ("processing.watchdog.error", "warning", "Processing watchdog error"),
        ("processing.watchdog.restore", "info", "Processing watchdog restored"),
    ]
    .into_iter()
    .map(|(event_type, severity, title)| {
        (
            event_type.to_string(),
            AlertRule { severity: severity.to_string(), title: title.to_string() },
        )
    })
    .collect()
}

/// Default rules overlaid with any config-supplied overrides, keyed by
/// `event_type`.
fn merged_rules(config: &AlertsConfig) -> BTreeMap<String, AlertRule> {
    let mut merged = default_rules();
    for (event_type, rule) in &config.rules {
        merged.insert(event_type.clone(), rule.clone());
    }
    merged
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub alert_id: String,
    pub event_type: String,
    pub severity: String,
    pub title: String,
    pub ts_utc: String,
    pub payload: Value,
}

/// Derives alerts from `events`, most-recent-`max_records` window applied
/// first, then filtered through the configured rule table. Events whose
/// `event_type` has no matching rule produce no alert.
pub fn derive_alerts(config: &AlertsConfig, events: &[JournalEvent]) -> Vec<Alert> {
    if !config.enabled {
        return Vec::new();
    }

    let windowed: &[JournalEvent] = if config.max_records > 0 && (events.len() as u64) > config.max_records {
        &events[events.len() - config.max_records as usize..]
    } else {
        events
    };

    let rules = merged_rules(config);
    windowed
        .iter()
        .filter_map(|event| {
            let rule = rules.get(&event.event_type)?;
            Some(Alert {
                alert_id: if !event.event_id.is_empty() {
                    event.event_id.clone()
                } else {
                    event.sequence.to_string()
                },
                event_type: event.event_type.clone(),
                severity: rule.severity.clone(),
                title: rule.title.clone(),
                ts_utc: event.ts_utc.clone(),
                payload: event.payload.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, seq: u64) -> JournalEvent {
        JournalEvent {
            schema_version: 1,
            event_id: String::new(),
            sequence: seq,
            ts_utc: "2026-01-01T00:00:00Z".to_string(),
            tzid: "UTC".to_string(),
            offset_minutes: 0,
            event_type: event_type.to_string(),
            payload: serde_json::json!({}),
            run_id: "run1".to_string(),
        }
    }

    #[test]
    fn unknown_event_type_produces_no_alert() {
        let config = AlertsConfig { enabled: true, rules: Default::default(), max_records: 0 };
        let alerts = derive_alerts(&config, &[event("not.a.rule", 1)]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn known_event_type_maps_to_default_rule() {
        let config = AlertsConfig { enabled: true, rules: Default::default(), max_records: 0 };
        let alerts = derive_alerts(&config, &[event("capture.halt_disk", 1)]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, "critical");
    }

    #[test]
    fn disabled_config_yields_no_alerts() {
        let config = AlertsConfig { enabled: false, rules: Default::default(), max_records: 0 };
        let alerts = derive_alerts(&config, &[event("disk.pressure", 1)]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn max_records_windows_to_most_recent() {
        let config = AlertsConfig { enabled: true, rules: Default::default(), max_records: 1 };
        let events = vec![event("disk.pressure", 1), event("disk.critical", 2)];
        let alerts = derive_alerts(&config, &events);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].event_type, "disk.critical");
    }

    #[test]
    fn config_override_replaces_default_rule() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "disk.pressure".to_string(),
            AlertRule { severity: "critical".to_string(), title: "Custom".to_string() },
        );
        let config = AlertsConfig { enabled: true, rules, max_records: 0 };
        let alerts = derive_alerts(&config, &[event("disk.pressure", 1)]);
        assert_eq!(alerts[0].severity, "critical");
        assert_eq!(alerts[0].title, "Custom");
    }
}
