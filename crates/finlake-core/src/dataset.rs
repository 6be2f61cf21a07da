use std::collections::HashMap;

use crate::error::{CoreError, Result};
use crate::value::Value;

/// An ordered set of column values for one record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn set(&mut self, idx: usize, value: Value) {
        if idx >= self.values.len() {
            self.values.resize(idx + 1, Value::Null);
        }
        self.values[idx] = value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn pad_to(&mut self, width: usize) {
        self.values.resize(width, Value::Null);
    }
}

/// Borrowed view of a row with name-based access.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    dataset: &'a Dataset,
    row: &'a Row,
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.dataset
            .column_index(column)
            .and_then(|idx| self.row.get(idx))
    }

    /// Value of the column, with missing columns reported as `Null`.
    pub fn value(&self, column: &str) -> &'a Value {
        const NULL: &Value = &Value::Null;
        self.get(column).unwrap_or(NULL)
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }
}

/// A rectangular table of rows sharing one header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row);
        }
        dataset
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Row) {
        row.pad_to(self.columns.len());
        self.rows.push(row);
    }

    pub fn record(&self, idx: usize) -> Option<Record<'_>> {
        self.rows.get(idx).map(|row| Record { dataset: self, row })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |row| Record { dataset: self, row })
    }

    /// Ensure the column exists, returning its index.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        let width = self.columns.len();
        for row in &mut self.rows {
            row.pad_to(width);
        }
        width - 1
    }

    /// Rewrite every cell of a column in place.
    pub fn map_column<F>(&mut self, column: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&Value) -> Value,
    {
        let idx = self
            .column_index(column)
            .ok_or_else(|| CoreError::MissingColumn(column.to_string()))?;
        for row in &mut self.rows {
            let next = f(&row.values[idx]);
            row.values[idx] = next;
        }
        Ok(())
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(Record<'_>) -> bool,
    {
        let columns = self.columns.clone();
        let view = Dataset::new(columns);
        self.rows.retain(|row| keep(Record { dataset: &view, row }));
    }

    /// Keep only the listed columns, in the listed order.
    pub fn project(&self, columns: &[String]) -> Result<Dataset> {
        let mut indices = Vec::with_capacity(columns.len());
        for column in columns {
            let idx = self
                .column_index(column)
                .ok_or_else(|| CoreError::MissingColumn(column.clone()))?;
            indices.push(idx);
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                Row::new(
                    indices
                        .iter()
                        .map(|idx| row.values[*idx].clone())
                        .collect(),
                )
            })
            .collect();
        Ok(Dataset {
            columns: columns.to_vec(),
            rows,
        })
    }

    /// Concatenate datasets, taking the union of their headers in first-seen
    /// order and filling absent columns with `Null`.
    pub fn concat(parts: Vec<Dataset>) -> Dataset {
        let mut columns: Vec<String> = Vec::new();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        for part in &parts {
            for column in &part.columns {
                if !lookup.contains_key(column) {
                    lookup.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let width = columns.len();
        let mut rows = Vec::new();
        for part in parts {
            let positions: Vec<usize> = part.columns.iter().map(|c| lookup[c]).collect();
            for row in part.rows {
                let mut values = vec![Value::Null; width];
                for (src, value) in row.values.into_iter().enumerate() {
                    if let Some(dst) = positions.get(src) {
                        values[*dst] = value;
                    }
                }
                rows.push(Row::new(values));
            }
        }

        Dataset { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::with_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter().map(Row::new).collect(),
        )
    }

    #[test]
    fn concat_unions_headers() {
        let a = dataset(&["ticker", "close"], vec![vec!["AAPL".into(), 1.0.into()]]);
        let b = dataset(&["close", "volume"], vec![vec![2.0.into(), 10i64.into()]]);

        let merged = Dataset::concat(vec![a, b]);
        assert_eq!(merged.columns(), ["ticker", "close", "volume"]);
        assert_eq!(merged.len(), 2);
        let second = merged.record(1).expect("second row");
        assert!(second.value("ticker").is_null());
        assert_eq!(second.value("close"), &Value::Float(2.0));
        assert_eq!(second.value("volume"), &Value::Int(10));
    }

    #[test]
    fn project_reports_missing_columns() {
        let data = dataset(&["rank", "company"], Vec::new());
        let err = data
            .project(&["rank".to_string(), "ticker".to_string()])
            .expect_err("ticker is missing");
        assert!(matches!(err, CoreError::MissingColumn(column) if column == "ticker"));
    }

    #[test]
    fn push_row_pads_short_rows() {
        let mut data = dataset(&["a", "b", "c"], Vec::new());
        data.push_row(Row::new(vec![Value::Int(1)]));
        assert_eq!(data.rows()[0].len(), 3);
    }
}
