use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Command;

use finlake_core::{ExecutionContext, RULES_VERSION, RunMode};
use serde::Serialize;

use crate::workspace::PipelineSettings;

use super::{RegistryError, RegistryResult};

/// JSON config written to each execution directory.
#[derive(Debug, Serialize)]
pub struct RunConfig<'a> {
    pub run_id: &'a str,
    pub started_at: String,
    pub rules_version: &'static str,
    #[serde(flatten)]
    pub mode: RunMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<&'a str>,
    pub settings: &'a PipelineSettings,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
}

/// Record the run configuration and create an empty `logs.ndjson`.
pub fn start_run(
    ctx: &ExecutionContext,
    settings: &PipelineSettings,
    job_id: Option<&str>,
) -> RegistryResult<RunPaths> {
    let config_path = ctx.path("config.json");
    let logs_path = ctx.path("logs.ndjson");

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        rules_version: RULES_VERSION,
        mode: ctx.mode,
        job_id,
        settings,
        git: collect_git_info(),
    };
    write_json(&config_path, &config)?;

    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        config_path,
        logs_path,
    })
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new().create(true).truncate(true).write(true).open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}
