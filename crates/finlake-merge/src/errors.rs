use std::path::PathBuf;

use finlake_core::CoreError;
use finlake_rules::RuleError;
use thiserror::Error;

/// Errors emitted by the merge orchestrator.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The base table produced no usable data; the run cannot continue.
    #[error("base table {table} failed: {reason}")]
    BaseTableFailed { table: String, reason: String },
    #[error("invalid source configuration: {0}")]
    Config(String),
    #[error("source directory not found: {0}")]
    MissingSource(PathBuf),
    #[error("no source files matched for table {0}")]
    NoData(String),
    #[error("no valid rows for table {0}")]
    NoValidRows(String),
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
