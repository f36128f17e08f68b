//! Hierarchical configuration, loaded from `<data_dir>/config.json`.
//!
//! Generalizes the teacher's flat `KEY=value` `~/.vigilo/config` loader into
//! the typed dict of spec.md §6.4. A defaulted `Config::default()` is always
//! valid; `Config::load` overlays whatever the file provides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskPressureConfig {
    pub warn_free_gb: u64,
    pub soft_free_gb: u64,
    pub critical_free_gb: u64,
    pub watermark_soft_mb: u64,
    pub watermark_hard_mb: u64,
}

impl Default for DiskPressureConfig {
    fn default() -> Self {
        DiskPressureConfig {
            warn_free_gb: 20,
            soft_free_gb: 10,
            critical_free_gb: 3,
            watermark_soft_mb: 2048,
            watermark_hard_mb: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolOverflowConfig {
    pub enabled: bool,
    pub dir: String,
    pub drain_interval_s: u64,
    pub max_drain_per_tick: u32,
}

impl Default for SpoolOverflowConfig {
    fn default() -> Self {
        SpoolOverflowConfig {
            enabled: true,
            dir: "overflow".to_string(),
            drain_interval_s: 30,
            max_drain_per_tick: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpilloverConfig {
    pub enabled: bool,
    pub on_level: String,
}

impl Default for SpilloverConfig {
    fn default() -> Self {
        SpilloverConfig {
            enabled: false,
            on_level: "soft".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub disk_pressure: DiskPressureConfig,
    pub spool_overflow: SpoolOverflowConfig,
    pub spillover: SpilloverConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: ".autocapture".to_string(),
            disk_pressure: DiskPressureConfig::default(),
            spool_overflow: SpoolOverflowConfig::default(),
            spillover: SpilloverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InputTrackingConfig {
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
}
impl Default for ScreenshotConfig {
    fn default() -> Self {
        ScreenshotConfig { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToggleConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub screenshot: ScreenshotConfig,
    pub audio: ToggleConfig,
    pub video: ToggleConfig,
    pub window_metadata: ToggleConfig,
    pub input_tracking: InputTrackingConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            screenshot: ScreenshotConfig::default(),
            audio: ToggleConfig::default(),
            video: ToggleConfig::default(),
            window_metadata: ToggleConfig { enabled: true },
            input_tracking: InputTrackingConfig {
                mode: "metadata_only".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyCaptureConfig {
    pub require_consent: bool,
}
impl Default for PrivacyCaptureConfig {
    fn default() -> Self {
        PrivacyCaptureConfig {
            require_consent: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrivacyEgressConfig {
    pub allow_raw_egress: bool,
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrivacyConfig {
    pub capture: PrivacyCaptureConfig,
    pub egress: PrivacyEgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureControlsConfig {
    pub enabled: bool,
}
impl Default for CaptureControlsConfig {
    fn default() -> Self {
        CaptureControlsConfig { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub run_id: String,
    pub timezone: String,
    pub capture_controls: CaptureControlsConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            run_id: String::new(),
            timezone: "UTC".to_string(),
            capture_controls: CaptureControlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginsConfig {
    pub safe_mode: bool,
    pub allowlist: Vec<String>,
    pub enabled: std::collections::BTreeMap<String, bool>,
    pub default_pack: Vec<String>,
    pub search_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AlertRule {
    pub severity: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub rules: std::collections::BTreeMap<String, AlertRule>,
    pub max_records: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        AlertsConfig {
            enabled: true,
            rules: Default::default(),
            max_records: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub iou_threshold: f64,
    pub max_parallel_sessions: u32,
    pub spool_dir: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            iou_threshold: 0.1,
            max_parallel_sessions: 4,
            spool_dir: "spool".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: u32,
    pub timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            top_k: 20,
            timeout_ms: 500,
        }
    }
}

/// Hierarchical configuration dict, per spec.md §6.4.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub privacy: PrivacyConfig,
    pub runtime: RuntimeConfig,
    pub plugins: PluginsConfig,
    pub alerts: AlertsConfig,
    pub ingest: IngestConfig,
    pub query: QueryConfig,
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("config.json")
    }

    /// Load configuration from `path`, falling back to defaults for any
    /// field the file omits and for the file itself when absent.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic::atomic_write_json(path, self)
    }

    /// Enable raw egress only when the caller supplies the exact
    /// confirmation token, per spec.md §6.4.
    pub fn set_allow_raw_egress(&mut self, confirmation_token: &str) -> Result<()> {
        if confirmation_token != "I UNDERSTAND" {
            anyhow::bail!(crate::error::ErrorKind::ConfigError(
                "allow_raw_egress requires confirmation token \"I UNDERSTAND\"".to_string()
            ));
        }
        self.privacy.egress.allow_raw_egress = true;
        self.privacy.egress.confirmation_token = Some(confirmation_token.to_string());
        Ok(())
    }
}
