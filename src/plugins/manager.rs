//! Enablement, hot-reload, and lazy factory load over discovered
//! manifests. Grounded on `autocapture/plugins/manager.py`.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::PluginsConfig;
use crate::logging::DiagnosticLogger;
use crate::models::PluginExtension;

use super::manifest::{discover, DiscoveredManifest};

fn is_safe_mode_compliant(ext: &PluginExtension) -> bool {
    ext.pillars.security.sandbox == "inproc"
        && matches!(ext.pillars.security.network_access.as_str(), "none" | "localhost")
}

/// `(plugin_id, extension_name) -> cached instance token`. The manager
/// never actually imports plugin code; `get_extension` resolves to a
/// factory string here, and the caller (capability registry) is
/// responsible for invoking it and caching the real instance.
#[derive(Debug, Clone)]
pub struct ExtensionSlot {
    pub plugin_id: String,
    pub kind: String,
    pub factory: String,
    pub name: String,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginLoadFailed {
    pub plugin_id: String,
    pub kind: String,
    pub factory: String,
    pub manifest: String,
    pub error_class: String,
}

impl std::fmt::Display for PluginLoadFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "plugin load failed: plugin_id={} kind={} factory={} manifest={} error_class={}",
            self.plugin_id, self.kind, self.factory, self.manifest, self.error_class
        )
    }
}
impl std::error::Error for PluginLoadFailed {}

pub struct PluginManager {
    manifests: Vec<DiscoveredManifest>,
    fingerprints: HashMap<PathBuf, String>,
    cached_instances: HashMap<(String, String), String>,
    diagnostics: Option<DiagnosticLogger>,
}

impl PluginManager {
    pub fn discover(roots: &[PathBuf]) -> Result<Self> {
        let manifests = discover(roots)?;
        let fingerprints = manifests
            .iter()
            .map(|m| (m.path.clone(), m.mtime_hash.clone()))
            .collect();
        Ok(PluginManager {
            manifests,
            fingerprints,
            cached_instances: HashMap::new(),
            diagnostics: None,
        })
    }

    /// Opts into structured NDJSON diagnostics (`logs/plugins.ndjson` under
    /// `data_dir`) for subsequent `get_extension` loads.
    pub fn with_diagnostics(mut self, data_dir: &Path) -> Self {
        self.diagnostics = Some(DiagnosticLogger::new(data_dir, "plugins"));
        self
    }

    /// Re-scan `roots`; manifests whose fingerprint changed have their
    /// cached instances dropped and are marked for factory re-import on
    /// next access.
    pub fn hot_reload(&mut self, roots: &[PathBuf]) -> Result<Vec<String>> {
        let fresh = discover(roots)?;
        let mut changed_plugin_ids = Vec::new();

        for m in &fresh {
            let prior = self.fingerprints.get(&m.path);
            if prior != Some(&m.mtime_hash) {
                changed_plugin_ids.push(m.manifest.plugin_id.clone());
                self.cached_instances
                    .retain(|(pid, _), _| pid != &m.manifest.plugin_id);
            }
        }

        self.fingerprints = fresh.iter().map(|m| (m.path.clone(), m.mtime_hash.clone())).collect();
        self.manifests = fresh;
        Ok(changed_plugin_ids)
    }

    /// Enabled plugin ids: explicit `enabled` map wins; otherwise
    /// allowlist membership; otherwise (if `safe_mode`) membership in
    /// `default_pack` subject to the safe-mode capability check.
    pub fn enabled_plugin_ids(&self, config: &PluginsConfig) -> Vec<String> {
        let mut out = Vec::new();
        for m in &self.manifests {
            let pid = &m.manifest.plugin_id;
            let explicit = config.enabled.get(pid).copied();
            let allowed = match explicit {
                Some(v) => v,
                None => {
                    if config.allowlist.contains(pid) {
                        true
                    } else if config.safe_mode && config.default_pack.contains(pid) {
                        m.manifest.extensions.iter().all(is_safe_mode_compliant)
                    } else {
                        false
                    }
                }
            };
            if allowed {
                out.push(pid.clone());
            }
        }
        out
    }

    /// All extension slots across enabled plugins matching `kind`
    /// (and, optionally, `name`).
    pub fn find_extensions(
        &self,
        config: &PluginsConfig,
        kind: &str,
        name: Option<&str>,
    ) -> Vec<ExtensionSlot> {
        let enabled = self.enabled_plugin_ids(config);
        let mut out = Vec::new();
        for m in &self.manifests {
            if !enabled.contains(&m.manifest.plugin_id) {
                continue;
            }
            for ext in &m.manifest.extensions {
                if ext.kind != kind {
                    continue;
                }
                if let Some(n) = name {
                    if ext.name != n {
                        continue;
                    }
                }
                out.push(ExtensionSlot {
                    plugin_id: m.manifest.plugin_id.clone(),
                    kind: ext.kind.clone(),
                    factory: ext.factory.clone(),
                    name: ext.name.clone(),
                    manifest_path: m.path.clone(),
                });
            }
        }
        out
    }

    /// Lazily resolve an extension, caching `(plugin_id, name) ->
    /// factory` on first access. `invoke_factory` is supplied by the
    /// caller so this module never hard-codes a factory dispatch table.
    pub fn get_extension(
        &mut self,
        config: &PluginsConfig,
        kind: &str,
        name: Option<&str>,
        invoke_factory: impl FnOnce(&ExtensionSlot) -> Result<String, String>,
    ) -> Result<String, PluginLoadFailed> {
        let candidates = self.find_extensions(config, kind, name);
        let slot = candidates.into_iter().next().ok_or_else(|| PluginLoadFailed {
            plugin_id: "unknown".to_string(),
            kind: kind.to_string(),
            factory: "unknown".to_string(),
            manifest: "unknown".to_string(),
            error_class: "ExtensionNotFound".to_string(),
        })?;

        let cache_key = (slot.plugin_id.clone(), slot.name.clone());
        if let Some(cached) = self.cached_instances.get(&cache_key) {
            return Ok(cached.clone());
        }

        match invoke_factory(&slot) {
            Ok(instance) => {
                if let Some(logger) = &self.diagnostics {
                    let _ = logger.event(
                        "plugin.load_ok",
                        &slot.plugin_id,
                        serde_json::json!({"kind": slot.kind, "factory": slot.factory}),
                    );
                }
                self.cached_instances.insert(cache_key, instance.clone());
                Ok(instance)
            }
            Err(error_class) => {
                if let Some(logger) = &self.diagnostics {
                    let _ = logger.event(
                        "plugin.load_failed",
                        &slot.plugin_id,
                        serde_json::json!({"kind": slot.kind, "factory": slot.factory, "error_class": error_class}),
                    );
                }
                Err(PluginLoadFailed {
                    plugin_id: slot.plugin_id,
                    kind: slot.kind,
                    factory: slot.factory,
                    manifest: slot.manifest_path.display().to_string(),
                    error_class,
                })
            }
        }
    }

    pub fn manifests(&self) -> &[DiscoveredManifest] {
        &self.manifests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &std::path::Path, plugin_id: &str, sandbox: &str, network: &str) {
        let content = format!(
            r#"{{
            "plugin_id": "{plugin_id}",
            "schema_version": 1,
            "version": "0.1.0",
            "extensions": [{{
                "kind": "ocr.engine",
                "factory": "demo::make_ocr",
                "name": "{plugin_id}-ocr",
                "version": "0.1.0",
                "caps": [],
                "pillars": {{"security": {{"sandbox": "{sandbox}", "network_access": "{network}"}}}}
            }}]
        }}"#
        );
        std::fs::write(dir.join(format!("{plugin_id}.json")), content).unwrap();
    }

    #[test]
    fn allowlisted_plugin_is_enabled() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "demo", "inproc", "none");
        let mgr = PluginManager::discover(&[dir.path().to_path_buf()]).unwrap();
        let mut cfg = PluginsConfig::default();
        cfg.allowlist.push("demo".to_string());
        assert_eq!(mgr.enabled_plugin_ids(&cfg), vec!["demo".to_string()]);
    }

    #[test]
    fn safe_mode_rejects_network_plugin_in_default_pack() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "netty", "inproc", "full");
        let mgr = PluginManager::discover(&[dir.path().to_path_buf()]).unwrap();
        let mut cfg = PluginsConfig::default();
        cfg.safe_mode = true;
        cfg.default_pack.push("netty".to_string());
        assert!(mgr.enabled_plugin_ids(&cfg).is_empty());
    }

    #[test]
    fn explicit_enabled_map_overrides_allowlist() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "demo", "inproc", "none");
        let mgr = PluginManager::discover(&[dir.path().to_path_buf()]).unwrap();
        let mut cfg = PluginsConfig::default();
        cfg.allowlist.push("demo".to_string());
        cfg.enabled.insert("demo".to_string(), false);
        assert!(mgr.enabled_plugin_ids(&cfg).is_empty());
    }

    #[test]
    fn hot_reload_drops_cache_on_content_change() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "demo", "inproc", "none");
        let mut mgr = PluginManager::discover(&[dir.path().to_path_buf()]).unwrap();
        let cfg = {
            let mut c = PluginsConfig::default();
            c.allowlist.push("demo".to_string());
            c
        };
        mgr.get_extension(&cfg, "ocr.engine", None, |_| Ok("instance-1".to_string()))
            .unwrap();

        write_manifest(dir.path(), "demo", "inproc", "localhost");
        let changed = mgr.hot_reload(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(changed, vec!["demo".to_string()]);

        let resolved = mgr
            .get_extension(&cfg, "ocr.engine", None, |_| Ok("instance-2".to_string()))
            .unwrap();
        assert_eq!(resolved, "instance-2");
    }

    #[test]
    fn factory_failure_is_structured() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "demo", "inproc", "none");
        let mut mgr = PluginManager::discover(&[dir.path().to_path_buf()]).unwrap();
        let mut cfg = PluginsConfig::default();
        cfg.allowlist.push("demo".to_string());
        let err = mgr
            .get_extension(&cfg, "ocr.engine", None, |_| Err("ImportError".to_string()))
            .unwrap_err();
        assert_eq!(err.plugin_id, "demo");
        assert_eq!(err.error_class, "ImportError");
    }

    #[test]
    fn diagnostics_logger_records_load_outcomes() {
        let dir = tempdir().unwrap();
        write_manifest(dir.path(), "demo", "inproc", "none");
        write_manifest(dir.path(), "other", "inproc", "none");
        let mut mgr = PluginManager::discover(&[dir.path().to_path_buf()])
            .unwrap()
            .with_diagnostics(dir.path());
        let mut cfg = PluginsConfig::default();
        cfg.allowlist.push("demo".to_string());
        cfg.allowlist.push("other".to_string());

        mgr.get_extension(&cfg, "ocr.engine", Some("demo-ocr"), |_| Ok("instance-1".to_string()))
            .unwrap();
        let _ = mgr.get_extension(&cfg, "ocr.engine", Some("other-ocr"), |_| Err("ImportError".to_string()));

        let logger = DiagnosticLogger::new(dir.path(), "plugins");
        let events = logger.read_all().unwrap();
        assert_eq!(events[0]["event"], serde_json::json!("plugin.load_ok"));
        assert_eq!(events[1]["event"], serde_json::json!("plugin.load_failed"));
    }
}
