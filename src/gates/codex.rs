//! `codex validate`: runs a declarative requirement spec (artifacts +
//! validators per requirement) and reports pass/fail per requirement.
//! Ported from `autocapture/codex/{spec,validators,report}.py`.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

use crate::timebase;

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub expected_exit_code: i32,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub must_contain_json_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequirementSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub pillars: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodexSpec {
    pub blueprint_id: String,
    pub codex_spec_version: u32,
    pub requirements: Vec<RequirementSpec>,
}

pub fn load_spec(path: &Path) -> Result<CodexSpec> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading codex spec {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing codex spec {}", path.display()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidatorReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementReport {
    pub id: String,
    pub title: String,
    pub pillars: Vec<String>,
    pub artifacts_ok: bool,
    pub artifacts_missing: Vec<String>,
    pub validators: Vec<ValidatorReport>,
}

impl RequirementReport {
    pub fn ok(&self) -> bool {
        self.artifacts_ok && self.validators.iter().all(|v| v.ok)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodexReport {
    pub blueprint_id: String,
    pub codex_spec_version: u32,
    pub generated_at: String,
    pub requirements: Vec<RequirementReport>,
}

impl CodexReport {
    pub fn passed(&self) -> usize {
        self.requirements.iter().filter(|r| r.ok()).count()
    }
    pub fn failed(&self) -> usize {
        self.requirements.len() - self.passed()
    }
}

fn run_command(command: &[String]) -> std::io::Result<std::process::Output> {
    if command.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty validator command"));
    }
    Command::new(&command[0]).args(&command[1..]).output()
}

fn run_validator(spec: &ValidatorSpec) -> ValidatorReport {
    match spec.kind.as_str() {
        "cli_exit" => match run_command(&spec.command) {
            Ok(out) => {
                let code = out.status.code().unwrap_or(-1);
                let ok = code == spec.expected_exit_code;
                ValidatorReport {
                    kind: spec.kind.clone(),
                    ok,
                    detail: if ok { "ok".to_string() } else { format!("exit={code}") },
                }
            }
            Err(e) => ValidatorReport { kind: spec.kind.clone(), ok: false, detail: format!("spawn_failed: {e}") },
        },
        "cli_output_regex_absent" => match run_command(&spec.command) {
            Ok(out) => {
                let haystack = format!(
                    "{}\n{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                );
                let violations: Vec<&String> = spec
                    .patterns
                    .iter()
                    .filter(|pat| Regex::new(pat).map(|re| re.is_match(&haystack)).unwrap_or(false))
                    .collect();
                let ok = violations.is_empty();
                ValidatorReport {
                    kind: spec.kind.clone(),
                    ok,
                    detail: if ok {
                        "ok".to_string()
                    } else {
                        format!("patterns_present: {:?}", violations)
                    },
                }
            }
            Err(e) => ValidatorReport { kind: spec.kind.clone(), ok: false, detail: format!("spawn_failed: {e}") },
        },
        "cli_json" => match run_command(&spec.command) {
            Ok(out) if out.status.success() => {
                match serde_json::from_slice::<serde_json::Value>(&out.stdout) {
                    Ok(payload) => {
                        let missing: Vec<&String> = spec
                            .must_contain_json_keys
                            .iter()
                            .filter(|k| payload.get(k.as_str()).is_none())
                            .collect();
                        let ok = missing.is_empty();
                        ValidatorReport {
                            kind: spec.kind.clone(),
                            ok,
                            detail: if ok { "ok".to_string() } else { format!("missing_keys: {:?}", missing) },
                        }
                    }
                    Err(e) => ValidatorReport { kind: spec.kind.clone(), ok: false, detail: format!("invalid_json: {e}") },
                }
            }
            Ok(out) => ValidatorReport {
                kind: spec.kind.clone(),
                ok: false,
                detail: format!("exit={}", out.status.code().unwrap_or(-1)),
            },
            Err(e) => ValidatorReport { kind: spec.kind.clone(), ok: false, detail: format!("spawn_failed: {e}") },
        },
        other => ValidatorReport {
            kind: other.to_string(),
            ok: false,
            detail: "unknown_validator_type".to_string(),
        },
    }
}

pub fn validate(spec: &CodexSpec, project_root: &Path) -> CodexReport {
    let requirements = spec
        .requirements
        .iter()
        .map(|req| {
            let missing: Vec<String> = req
                .artifacts
                .iter()
                .filter(|a| !project_root.join(a).exists())
                .cloned()
                .collect();
            let validators = req.validators.iter().map(run_validator).collect();
            RequirementReport {
                id: req.id.clone(),
                title: req.title.clone(),
                pillars: req.pillars.clone(),
                artifacts_ok: missing.is_empty(),
                artifacts_missing: missing,
                validators,
            }
        })
        .collect();

    CodexReport {
        blueprint_id: spec.blueprint_id.clone(),
        codex_spec_version: spec.codex_spec_version,
        generated_at: timebase::utc_now_z(),
        requirements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_artifact_fails_the_requirement() {
        let dir = tempdir().unwrap();
        let spec = CodexSpec {
            blueprint_id: "bp".to_string(),
            codex_spec_version: 1,
            requirements: vec![RequirementSpec {
                id: "R1".to_string(),
                title: "needs a file".to_string(),
                pillars: vec![],
                artifacts: vec!["missing.json".to_string()],
                validators: vec![],
            }],
        };
        let report = validate(&spec, dir.path());
        assert!(!report.requirements[0].ok());
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn present_artifact_and_passing_cli_exit_validator_passes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("present.json"), "{}").unwrap();
        let spec = CodexSpec {
            blueprint_id: "bp".to_string(),
            codex_spec_version: 1,
            requirements: vec![RequirementSpec {
                id: "R2".to_string(),
                title: "ok".to_string(),
                pillars: vec![],
                artifacts: vec!["present.json".to_string()],
                validators: vec![ValidatorSpec {
                    kind: "cli_exit".to_string(),
                    command: vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()],
                    expected_exit_code: 0,
                    patterns: vec![],
                    must_contain_json_keys: vec![],
                }],
            }],
        };
        let report = validate(&spec, dir.path());
        assert!(report.requirements[0].ok());
        assert_eq!(report.passed(), 1);
    }

    #[test]
    fn unknown_validator_type_fails_closed() {
        let dir = tempdir().unwrap();
        let spec = CodexSpec {
            blueprint_id: "bp".to_string(),
            codex_spec_version: 1,
            requirements: vec![RequirementSpec {
                id: "R3".to_string(),
                title: "t".to_string(),
                pillars: vec![],
                artifacts: vec![],
                validators: vec![ValidatorSpec {
                    kind: "not_a_real_type".to_string(),
                    command: vec![],
                    expected_exit_code: 0,
                    patterns: vec![],
                    must_contain_json_keys: vec![],
                }],
            }],
        };
        let report = validate(&spec, dir.path());
        assert!(!report.requirements[0].ok());
    }
}
