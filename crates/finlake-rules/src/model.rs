use finlake_core::{Dataset, Row};
use serde::{Deserialize, Serialize};

/// Structured record of one failed check on one cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowFailure {
    pub row_index: usize,
    pub column: String,
    pub code: String,
    pub message: String,
}

/// A validated row: the input values next to their coerced copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    /// Position of the row in the validated input.
    pub index: usize,
    pub raw: Row,
    pub coerced: Row,
}

/// Outcome of validating one dataset against one table's rules.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub table: String,
    pub columns: Vec<String>,
    pub valid: Vec<ValidatedRow>,
    pub invalid: Vec<ValidatedRow>,
    pub failures: Vec<RowFailure>,
}

impl ValidationResult {
    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.len()
    }

    /// Valid partition with coerced values.
    pub fn valid_dataset(&self) -> Dataset {
        Dataset::with_rows(
            self.columns.clone(),
            self.valid.iter().map(|row| row.coerced.clone()).collect(),
        )
    }

    /// Invalid partition with the original input values.
    pub fn invalid_dataset(&self) -> Dataset {
        Dataset::with_rows(
            self.columns.clone(),
            self.invalid.iter().map(|row| row.raw.clone()).collect(),
        )
    }

    pub fn failures_for(&self, row_index: usize) -> impl Iterator<Item = &RowFailure> {
        self.failures
            .iter()
            .filter(move |failure| failure.row_index == row_index)
    }
}
