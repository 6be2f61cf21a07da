//! Turning discovered raw files into one candidate dataset per table.

use chrono::{Datelike, NaiveDate};
use finlake_core::{Dataset, RunMode, Value, read_csv};
use finlake_kpi::parse_quarter_label;
use tracing::{error, info, warn};

use crate::errors::MergeError;
use crate::sources::{SourceFile, TableSource};

const QUARTER_COLUMN: &str = "quarter";
const YEAR_COLUMN: &str = "year";

/// Candidate rows for one table plus the number of files they came from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub dataset: Dataset,
    pub files_read: usize,
}

/// Read, concatenate and prepare the raw files of `source`.
///
/// Unreadable files are logged and skipped. Quarterly sources get a `year`
/// column and `YYYY-Qn` labels; historical runs keep only quarters within
/// the requested range.
pub fn build_candidate(
    source: &TableSource,
    files: &[SourceFile],
    mode: &RunMode,
) -> Result<Candidate, MergeError> {
    let mut parts = Vec::with_capacity(files.len());
    for file in files {
        let mut dataset = match read_csv(&file.path) {
            Ok(dataset) => dataset,
            Err(err) => {
                error!(table = %source.name, path = %file.path.display(), error = %err, "failed to read source file");
                continue;
            }
        };
        if source.quarterly {
            if dataset.is_empty() {
                warn!(table = %source.name, path = %file.path.display(), "skipping empty file");
                continue;
            }
            date_quarters(&mut dataset, file.year)?;
        }
        info!(table = %source.name, path = %file.path.display(), rows = dataset.len(), "read source file");
        parts.push(dataset);
    }

    if parts.is_empty() {
        return Err(MergeError::NoData(source.name.clone()));
    }
    let files_read = parts.len();
    let mut dataset = Dataset::concat(parts);

    if source.quarterly {
        if let RunMode::Historical { start, end } = mode {
            retain_quarter_range(&mut dataset, *start, *end);
            if dataset.is_empty() {
                warn!(table = %source.name, "no quarters within the requested range");
                return Err(MergeError::NoData(source.name.clone()));
            }
        }
    }

    if let Some(columns) = &source.columns {
        dataset = dataset.project(columns)?;
    }
    for column in &source.numeric_cleanup {
        if dataset.has_column(column) {
            dataset.map_column(column, clean_numeric)?;
        }
    }

    Ok(Candidate {
        dataset,
        files_read,
    })
}

/// Add the file's year and rewrite bare `Qn` labels as `YYYY-Qn`.
fn date_quarters(dataset: &mut Dataset, year: i32) -> Result<(), MergeError> {
    dataset.ensure_column(YEAR_COLUMN);
    dataset.map_column(YEAR_COLUMN, |_| Value::Int(i64::from(year)))?;

    if dataset.has_column(QUARTER_COLUMN) {
        dataset.map_column(QUARTER_COLUMN, |value| match value {
            Value::Text(label) if !label.contains('-') => {
                Value::Text(format!("{year}-{}", label.trim()))
            }
            other => other.clone(),
        })?;
    }
    Ok(())
}

fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

/// Keep quarters from the start date's quarter through the end date's
/// quarter. Rows with unreadable labels are kept for validation to reject.
fn retain_quarter_range(dataset: &mut Dataset, start: NaiveDate, end: NaiveDate) {
    let first = (start.year(), quarter_of(start));
    let last = (end.year(), quarter_of(end));
    dataset.retain(|record| {
        let label = record.value(QUARTER_COLUMN).to_string();
        match parse_quarter_label(&label, start.year()) {
            Some(period) => period >= first && period <= last,
            None => true,
        }
    });
}

/// Strip currency symbols and thousands separators; unparseable text becomes null.
pub fn clean_numeric(value: &Value) -> Value {
    match value {
        Value::Text(raw) => {
            let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();
            cleaned
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Null)
        }
        other => other.clone(),
    }
}
