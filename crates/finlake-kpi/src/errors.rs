use std::path::PathBuf;

use finlake_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KpiError {
    #[error("kpi input not found: {0}")]
    MissingInput(PathBuf),
    #[error("kpi input is empty: {0}")]
    EmptyInput(String),
    #[error("kpi input {table} lacks column {column}")]
    MissingColumn { table: String, column: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
}
