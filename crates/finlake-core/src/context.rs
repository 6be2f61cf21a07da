use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Which slice of source data a run covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    /// Every period between `start` and `end`, inclusive.
    Historical { start: NaiveDate, end: NaiveDate },
    /// The single day `date`.
    Live { date: NaiveDate },
}

impl RunMode {
    pub fn historical(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(CoreError::InvalidRange(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(RunMode::Historical { start, end })
    }

    pub fn is_live(&self) -> bool {
        matches!(self, RunMode::Live { .. })
    }

    pub fn start(&self) -> NaiveDate {
        match self {
            RunMode::Historical { start, .. } => *start,
            RunMode::Live { date } => *date,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match self {
            RunMode::Historical { end, .. } => *end,
            RunMode::Live { date } => *date,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Historical { .. } => "historical",
            RunMode::Live { .. } => "live",
        }
    }
}

/// One pipeline run: its id, mode and output directory.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub mode: RunMode,
    pub dir: PathBuf,
}

impl ExecutionContext {
    /// Create a fresh run directory `<root>/<timestamp>__run_<id>`.
    pub fn create(root: &Path, mode: RunMode) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let timestamp = started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
        let dir = root.join(format!("{timestamp}__run_{run_id}"));
        create_dir_all(&dir)?;
        Ok(Self {
            run_id,
            started_at,
            mode,
            dir,
        })
    }

    /// Reuse an existing directory, e.g. to recompute facts from saved partitions.
    pub fn in_dir(dir: impl Into<PathBuf>, mode: RunMode) -> Result<Self> {
        let dir = dir.into();
        create_dir_all(&dir)?;
        Ok(Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            mode,
            dir,
        })
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn merged_path(&self, table: &str) -> PathBuf {
        self.path(&format!("merged_{table}.csv"))
    }

    pub fn valid_path(&self, table: &str) -> PathBuf {
        self.path(&format!("valid_{table}.csv"))
    }

    pub fn invalid_path(&self, table: &str) -> PathBuf {
        self.path(&format!("invalid_{table}.csv"))
    }

    pub fn violations_path(&self, table: &str) -> PathBuf {
        self.path(&format!("violations_{table}.json"))
    }
}
