use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;

use chrono::Utc;
use finlake_core::{ExecutionContext, RULES_VERSION, RunMode};
use serde::{Deserialize, Serialize};

use crate::errors::MergeError;
use crate::loader::LoadStats;
use crate::sources::Stage;

/// File name of the report inside the execution directory.
pub const REPORT_FILE: &str = "merge_report.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Processed,
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded(LoadStats),
    Failed { reason: String },
    /// No loader configured, or nothing to load.
    NotLoaded,
}

/// Summary of one table's pass through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableReport {
    pub table: String,
    pub stage: Stage,
    pub outcome: TableOutcome,
    pub files_read: usize,
    pub merged_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub duplicates_removed: usize,
    pub load: LoadOutcome,
}

impl TableReport {
    pub fn new(table: &str, stage: Stage) -> Self {
        Self {
            table: table.to_string(),
            stage,
            outcome: TableOutcome::Processed,
            files_read: 0,
            merged_rows: 0,
            valid_rows: 0,
            invalid_rows: 0,
            duplicates_removed: 0,
            load: LoadOutcome::NotLoaded,
        }
    }

    pub fn skipped(table: &str, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            outcome: TableOutcome::Skipped {
                reason: reason.into(),
            },
            ..Self::new(table, stage)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KpiOutcome {
    NotRun,
    Completed {
        rows: BTreeMap<String, usize>,
        loads: BTreeMap<String, LoadOutcome>,
    },
    Failed {
        reason: String,
    },
}

/// Report written to `merge_report.json` at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub run_id: String,
    pub rules_version: String,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub tables: Vec<TableReport>,
    pub kpi: KpiOutcome,
}

impl MergeReport {
    pub fn new(ctx: &ExecutionContext) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            rules_version: RULES_VERSION.to_string(),
            mode: ctx.mode,
            started_at: ctx.started_at.to_rfc3339(),
            finished_at: None,
            status: RunStatus::Running,
            tables: Vec::new(),
            kpi: KpiOutcome::NotRun,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|table| table.table == name)
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now().to_rfc3339());
    }

    pub fn write(&self, dir: &Path) -> Result<(), MergeError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(dir.join(REPORT_FILE))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
