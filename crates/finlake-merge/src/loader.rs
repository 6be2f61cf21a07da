use std::collections::HashSet;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use finlake_core::{CoreError, Dataset, Row, read_csv, write_csv};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a warehouse loader.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("table {table} has no key column {column}")]
    MissingKey { table: String, column: String },
}

/// Rows accepted and ignored by one load call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadStats {
    pub inserted: usize,
    pub ignored: usize,
}

/// Destination for valid partitions and fact tables.
///
/// Loads must be idempotent: rows whose key already exists are ignored.
pub trait WarehouseLoader {
    fn load(&mut self, table: &str, key: &[String], rows: &Dataset) -> Result<LoadStats, LoadError>;
}

/// File-backed warehouse keeping one `<table>.csv` per table.
#[derive(Debug, Clone)]
pub struct CsvWarehouse {
    dir: PathBuf,
}

impl CsvWarehouse {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    fn existing(&self, path: &Path) -> Result<Dataset, LoadError> {
        if path.exists() {
            Ok(read_csv(path)?)
        } else {
            Ok(Dataset::default())
        }
    }
}

impl WarehouseLoader for CsvWarehouse {
    fn load(&mut self, table: &str, key: &[String], rows: &Dataset) -> Result<LoadStats, LoadError> {
        create_dir_all(&self.dir)?;
        let path = self.table_path(table);
        let stored = self.existing(&path)?;

        let mut seen: HashSet<String> = HashSet::new();
        if !stored.is_empty() {
            let stored_key = key_indices(&stored, table, key)?;
            for row in stored.rows() {
                seen.insert(row_key(row, &stored_key));
            }
        }

        let incoming_key = key_indices(rows, table, key)?;
        let mut fresh = Dataset::new(rows.columns().to_vec());
        let mut stats = LoadStats::default();
        for row in rows.rows() {
            if seen.insert(row_key(row, &incoming_key)) {
                fresh.push_row(row.clone());
                stats.inserted += 1;
            } else {
                stats.ignored += 1;
            }
        }

        if stats.inserted > 0 || !path.exists() {
            let merged = Dataset::concat(vec![stored, fresh]);
            write_csv(&path, &merged)?;
        }
        Ok(stats)
    }
}

fn key_indices(dataset: &Dataset, table: &str, key: &[String]) -> Result<Vec<usize>, LoadError> {
    key.iter()
        .map(|column| {
            dataset
                .column_index(column)
                .ok_or_else(|| LoadError::MissingKey {
                    table: table.to_string(),
                    column: column.clone(),
                })
        })
        .collect()
}

/// Entity key of a row as a single string.
pub fn row_key(row: &Row, indices: &[usize]) -> String {
    indices
        .iter()
        .map(|idx| row.get(*idx).map(|value| value.key()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}
