use std::collections::{BTreeMap, HashMap, HashSet};

use finlake_core::{Dataset, Value};

/// Normalized form used for referential lookups.
pub fn normalize_key(value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    Some(value.to_string().trim().to_uppercase())
}

/// Already-validated tables available to referential checks during one run.
#[derive(Debug, Clone, Default)]
pub struct References {
    tables: BTreeMap<String, Dataset>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, dataset: Dataset) {
        self.tables.insert(table.into(), dataset);
    }

    pub fn get(&self, table: &str) -> Option<&Dataset> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Normalized values of `table.column`, when both are available.
    pub fn reference_set(&self, table: &str, column: &str) -> Option<ReferenceSet> {
        let dataset = self.tables.get(table)?;
        let idx = dataset.column_index(column)?;
        let values = dataset
            .rows()
            .iter()
            .filter_map(|row| row.get(idx).and_then(normalize_key))
            .collect();
        Some(ReferenceSet { values })
    }

    /// Ticker to company mapping of a reference table; later rows win.
    pub fn company_map(&self, table: &str) -> Option<HashMap<String, String>> {
        let dataset = self.tables.get(table)?;
        let ticker_idx = dataset.column_index("ticker")?;
        let company_idx = dataset.column_index("company")?;
        let mut map = HashMap::new();
        for row in dataset.rows() {
            let Some(ticker) = row.get(ticker_idx).and_then(normalize_key) else {
                continue;
            };
            match row.get(company_idx) {
                Some(company) if !company.is_null() => {
                    map.insert(ticker, company.to_string());
                }
                _ => {
                    map.remove(&ticker);
                }
            }
        }
        Some(map)
    }
}

/// Set of normalized (trimmed, upper-cased) values from one reference column.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    values: HashSet<String>,
}

impl ReferenceSet {
    pub fn contains(&self, value: &Value) -> bool {
        normalize_key(value).is_some_and(|key| self.values.contains(&key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
