//! Manifest discovery. Scans configured root(s) for `*.yaml|*.yml|*.json`
//! and parses them; never imports plugin code. Grounded on
//! `autocapture/plugins/manifest.py`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::models::PluginManifest;

#[derive(Debug, Clone)]
pub struct DiscoveredManifest {
    pub path: PathBuf,
    pub manifest: PluginManifest,
    pub mtime_hash: String,
}

fn parse_manifest_file(path: &Path) -> Result<PluginManifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let manifest: PluginManifest = if ext == "yaml" || ext == "yml" {
        serde_yaml::from_str(&text).with_context(|| format!("parsing yaml manifest {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing json manifest {}", path.display()))?
    };
    Ok(manifest)
}

/// Content fingerprint (sha256 of bytes + mtime) used for hot-reload
/// detection. Hashing the content rather than just mtime means a manifest
/// rewritten with identical bytes is not treated as changed.
fn fingerprint(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut combined = crate::canon::hash_bytes(&bytes);
    combined.push_str(&format!(":{mtime}"));
    Ok(combined)
}

/// Discover manifests under `roots`. Never evaluates/imports the plugin
/// code a manifest's `factory` strings reference — that happens lazily in
/// `manager.rs` on first `get_extension`.
pub fn discover(roots: &[PathBuf]) -> Result<Vec<DiscoveredManifest>> {
    let mut out = Vec::new();
    for root in roots {
        if !root.exists() {
            continue;
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(root)
            .with_context(|| format!("scanning plugin root {}", root.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml") | Some("json")
                )
            })
            .collect();
        paths.sort();

        for path in paths {
            let manifest = parse_manifest_file(&path)?;
            let mtime_hash = fingerprint(&path)?;
            out.push(DiscoveredManifest {
                path,
                manifest,
                mtime_hash,
            });
        }
    }
    Ok(out)
}
