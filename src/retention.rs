//! Disk-pressure evaluation. Reads free/total bytes for the filesystem
//! backing `data_dir` and classifies it against configured thresholds.
//! Never deletes anything. Grounded on `autocapture_nx/storage/retention.py`
//! and the teacher's `doctor.rs` use of `libc::statvfs` for free-space
//! checks.

use anyhow::{Context, Result};
use serde::Serialize;
use std::ffi::CString;
use std::mem::MaybeUninit;
use std::path::Path;

use crate::config::DiskPressureConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Ok,
    Warn,
    Soft,
    Critical,
}

impl PressureLevel {
    pub fn severity(&self) -> u8 {
        match self {
            PressureLevel::Ok => 0,
            PressureLevel::Warn => 1,
            PressureLevel::Soft => 2,
            PressureLevel::Critical => 3,
        }
    }

    pub fn parse(s: &str) -> Option<PressureLevel> {
        match s {
            "ok" => Some(PressureLevel::Ok),
            "warn" => Some(PressureLevel::Warn),
            "soft" => Some(PressureLevel::Soft),
            "critical" => Some(PressureLevel::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskPressureReport {
    pub level: PressureLevel,
    pub hard_halt: bool,
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Free/total bytes for the filesystem containing `path`, via
/// `libc::statvfs` — the same syscall the teacher's doctor uses.
pub fn disk_usage(path: &Path) -> Result<(u64, u64)> {
    let c_path = CString::new(path.to_string_lossy().as_bytes())
        .context("path contains interior NUL byte")?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        anyhow::bail!(crate::error::ErrorKind::TransientIo(format!(
            "statvfs failed for {}",
            path.display()
        )));
    }
    let stat = unsafe { stat.assume_init() };
    let free = stat.f_bavail as u64 * stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * stat.f_frsize as u64;
    Ok((free, total))
}

/// Classify disk pressure for `data_dir` against `config`. `hard_halt` is
/// true only when the hard watermark (in MB) is breached — a plain
/// `critical_free_gb` crossing is `critical` but does NOT halt capture,
/// per the original's `retention.py`.
pub fn evaluate_disk_pressure(config: &DiskPressureConfig, data_dir: &Path) -> Result<DiskPressureReport> {
    let (free_bytes, total_bytes) = disk_usage(data_dir)?;
    evaluate_from_bytes(config, free_bytes, total_bytes)
}

/// Pure classification, separated from the syscall for deterministic
/// testing.
pub fn evaluate_from_bytes(
    config: &DiskPressureConfig,
    free_bytes: u64,
    total_bytes: u64,
) -> Result<DiskPressureReport> {
    let free_mb = free_bytes / (1024 * 1024);
    let free_gb = free_bytes / (1024 * 1024 * 1024);

    let hard_halt = free_mb <= config.watermark_hard_mb;

    let level = if free_gb <= config.critical_free_gb {
        PressureLevel::Critical
    } else if free_gb <= config.soft_free_gb {
        PressureLevel::Soft
    } else if free_gb <= config.warn_free_gb {
        PressureLevel::Warn
    } else if free_mb <= config.watermark_soft_mb {
        PressureLevel::Soft
    } else {
        PressureLevel::Ok
    };

    Ok(DiskPressureReport {
        level,
        hard_halt,
        free_bytes,
        total_bytes,
    })
}

/// True iff the collector must stop writing to the primary store.
pub fn should_pause_capture(report: &DiskPressureReport) -> bool {
    report.hard_halt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DiskPressureConfig {
        DiskPressureConfig {
            warn_free_gb: 20,
            soft_free_gb: 10,
            critical_free_gb: 3,
            watermark_soft_mb: 2048,
            watermark_hard_mb: 512,
        }
    }

    #[test]
    fn ample_space_is_ok() {
        let r = evaluate_from_bytes(&cfg(), 100 * 1024 * 1024 * 1024, 500 * 1024 * 1024 * 1024).unwrap();
        assert_eq!(r.level, PressureLevel::Ok);
        assert!(!r.hard_halt);
        assert!(!should_pause_capture(&r));
    }

    #[test]
    fn critical_free_gb_alone_does_not_hard_halt() {
        let free = 2 * 1024 * 1024 * 1024u64; // 2GB < critical_free_gb=3 but way above hard watermark mb
        let r = evaluate_from_bytes(&cfg(), free, 500 * 1024 * 1024 * 1024).unwrap();
        assert_eq!(r.level, PressureLevel::Critical);
        assert!(!r.hard_halt);
    }

    #[test]
    fn watermark_hard_mb_triggers_hard_halt() {
        let free = 256 * 1024 * 1024u64; // 256MB <= hard watermark 512MB
        let r = evaluate_from_bytes(&cfg(), free, 500 * 1024 * 1024 * 1024).unwrap();
        assert!(r.hard_halt);
        assert!(should_pause_capture(&r));
    }

    #[test]
    fn warn_threshold_crossed() {
        let free = 15 * 1024 * 1024 * 1024u64; // 15GB <= warn 20, > soft 10
        let r = evaluate_from_bytes(&cfg(), free, 500 * 1024 * 1024 * 1024).unwrap();
        assert_eq!(r.level, PressureLevel::Warn);
    }

    #[test]
    fn never_deletes_anything() {
        // Pure classification function performs no filesystem mutation;
        // this test documents the invariant rather than exercising code.
        let r = evaluate_from_bytes(&cfg(), 1024, 2048).unwrap();
        assert_eq!(r.level, PressureLevel::Critical);
    }
}
