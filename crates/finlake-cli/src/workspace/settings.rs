use std::path::{Path, PathBuf};

use finlake_merge::{MergeOptions, TableSource, default_sources};
use serde::{Deserialize, Serialize};

use super::atomic::write_bytes_atomic;
use super::WorkspaceResult;

/// Scheduled live collection time used when none is configured.
pub const DEFAULT_SCHED_TIME: &str = "10:30";

/// Contents of `finlake.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    /// Root of the raw source directories.
    pub data_root: PathBuf,
    /// Where run directories and `jobs.json` are created.
    pub execution_root: PathBuf,
    pub rules_path: PathBuf,
    /// File-backed warehouse; loading is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_dir: Option<PathBuf>,
    pub sched_time: String,
    #[serde(default = "default_true")]
    pub compute_kpis: bool,
    #[serde(default = "default_sources")]
    pub sources: Vec<TableSource>,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            execution_root: PathBuf::from("Execution"),
            rules_path: PathBuf::from("config/rules.json"),
            warehouse_dir: Some(PathBuf::from("warehouse")),
            sched_time: DEFAULT_SCHED_TIME.to_string(),
            compute_kpis: true,
            sources: default_sources(),
        }
    }
}

impl PipelineSettings {
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            data_root: self.data_root.clone(),
            sources: self.sources.clone(),
            compute_kpis: self.compute_kpis,
        }
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.execution_root.join("jobs.json")
    }
}

pub fn load_or_create_settings(path: &Path) -> WorkspaceResult<PipelineSettings> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let settings: PipelineSettings = toml::from_str(&content)?;
        return Ok(settings);
    }

    let settings = PipelineSettings::default();
    save_settings(path, &settings)?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &PipelineSettings) -> WorkspaceResult<()> {
    let encoded = toml::to_string_pretty(settings)?;
    write_bytes_atomic(path, encoded.as_bytes())
}
