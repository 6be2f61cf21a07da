use std::collections::{HashMap, HashSet};

use finlake_core::{ColumnRule, Constraint, Dataset, Row, RuleCatalog, TableRules, Value};
use tracing::{info, warn};

use crate::coerce::coerce;
use crate::errors::RuleError;
use crate::model::{RowFailure, ValidatedRow, ValidationResult};
use crate::references::{ReferenceSet, References, normalize_key};

/// Config-driven validator that partitions datasets into valid and invalid rows.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    catalog: RuleCatalog,
}

impl RuleEngine {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Validate `dataset` against the rules registered for `table`.
    ///
    /// Uniqueness trackers live for the duration of this call only. Referential
    /// checks run only for tables present in `references`.
    pub fn validate(
        &self,
        dataset: &Dataset,
        table: &str,
        references: Option<&References>,
    ) -> Result<ValidationResult, RuleError> {
        let rules = self
            .catalog
            .table(table)
            .map_err(|_| RuleError::UnknownTable(table.to_string()))?;

        let mut columns = dataset.columns().to_vec();
        for name in rules.column_names() {
            if !columns.iter().any(|column| column == name) {
                columns.push(name.to_string());
            }
        }

        let mut state = ValidationState::new(rules, references);
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        let mut failures = Vec::new();

        for (index, input) in dataset.rows().iter().enumerate() {
            let mut raw = input.clone();
            if raw.len() < columns.len() {
                raw.set(columns.len() - 1, Value::Null);
            }
            let mut coerced = raw.clone();
            let before = failures.len();

            for rule in &rules.columns {
                let Some(idx) = columns.iter().position(|column| column == &rule.name) else {
                    continue;
                };
                let row_view = RowView {
                    columns: &columns,
                    row: &raw,
                };
                if let Some((code, message)) =
                    state.check_column(rule, &row_view, idx, &mut coerced)
                {
                    warn!(
                        table = %table,
                        row = index,
                        column = %rule.name,
                        code = %code,
                        "{message}"
                    );
                    failures.push(RowFailure {
                        row_index: index,
                        column: rule.name.clone(),
                        code,
                        message,
                    });
                }
            }

            let row = ValidatedRow {
                index,
                raw,
                coerced,
            };
            if failures.len() == before {
                valid.push(row);
            } else {
                invalid.push(row);
            }
        }

        info!(
            table = %table,
            valid = valid.len(),
            invalid = invalid.len(),
            "validation complete"
        );

        Ok(ValidationResult {
            table: table.to_string(),
            columns,
            valid,
            invalid,
            failures,
        })
    }
}

struct RowView<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl RowView<'_> {
    fn get(&self, column: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.row.get(idx))
            .unwrap_or(NULL)
    }
}

/// Per-call state: uniqueness trackers and resolved reference lookups.
struct ValidationState {
    seen: HashMap<(String, &'static str), HashSet<String>>,
    reference_sets: HashMap<String, Option<ReferenceSet>>,
    company_maps: HashMap<String, Option<HashMap<String, String>>>,
}

impl ValidationState {
    fn new(rules: &TableRules, references: Option<&References>) -> Self {
        let mut reference_sets = HashMap::new();
        let mut company_maps = HashMap::new();
        if let Some(refs) = references {
            for column in &rules.columns {
                for constraint in &column.constraints {
                    match constraint {
                        Constraint::Referential { table, column: ref_column } => {
                            reference_sets.insert(
                                column.name.clone(),
                                refs.reference_set(table, ref_column),
                            );
                        }
                        Constraint::MatchCompanyForTicker { table } => {
                            company_maps
                                .entry(table.clone())
                                .or_insert_with(|| refs.company_map(table));
                        }
                        _ => {}
                    }
                }
            }
        }

        Self {
            seen: HashMap::new(),
            reference_sets,
            company_maps,
        }
    }

    /// Normalize, coerce and check one cell. Returns the first failure.
    fn check_column(
        &mut self,
        rule: &ColumnRule,
        row: &RowView<'_>,
        idx: usize,
        coerced: &mut Row,
    ) -> Option<(String, String)> {
        let mut value = row.row.get(idx).cloned().unwrap_or(Value::Null);

        if rule.has("uppercase_trim") && !value.is_null() {
            value = Value::Text(value.to_string().trim().to_uppercase());
        }

        if !value.is_null() {
            match coerce(&value, rule.column_type) {
                Ok(next) => value = next,
                Err(message) => {
                    coerced.set(idx, value);
                    return Some(("type".to_string(), message));
                }
            }
        }
        coerced.set(idx, value.clone());

        for constraint in &rule.constraints {
            if let Some(message) = self.check(constraint, rule, &value, row) {
                return Some((constraint.code().to_string(), message));
            }
        }
        None
    }

    fn check(
        &mut self,
        constraint: &Constraint,
        rule: &ColumnRule,
        value: &Value,
        row: &RowView<'_>,
    ) -> Option<String> {
        match constraint {
            Constraint::NotNull => value.is_null().then(|| "null value".to_string()),
            Constraint::Nullable | Constraint::UppercaseTrim => None,
            Constraint::Positive => numeric_check(value, |n| n > 0.0, "not positive"),
            Constraint::NonNegative => numeric_check(value, |n| n >= 0.0, "negative value"),
            Constraint::InRange { min, max } => numeric_check(
                value,
                |n| *min <= n && n <= *max,
                &format!("out of range [{min}, {max}]"),
            ),
            Constraint::Unique => {
                if value.is_null() {
                    return Some("null in unique column".to_string());
                }
                self.track(&rule.name, "unique", value.key())
            }
            Constraint::UniqueTrimmed => {
                if value.is_null() {
                    return Some("null in unique column".to_string());
                }
                self.track(&rule.name, "unique_trimmed", value.to_string().trim().to_string())
            }
            Constraint::IsoDate => {
                if value.is_null() || value.as_date().is_some() {
                    None
                } else {
                    Some(format!("invalid date {value}"))
                }
            }
            Constraint::Pattern { source, regex } => {
                if value.is_null() || regex.is_match(&value.to_string()) {
                    None
                } else {
                    Some(format!("pattern mismatch ({value}) for {source}"))
                }
            }
            Constraint::Referential { table, column } => {
                let Some(Some(set)) = self.reference_sets.get(&rule.name) else {
                    return None;
                };
                if set.contains(value) {
                    None
                } else {
                    Some(format!(
                        "referential check failed ({value}) against {table}.{column}"
                    ))
                }
            }
            Constraint::MatchCompanyForTicker { table } => {
                let Some(Some(companies)) = self.company_maps.get(table) else {
                    return None;
                };
                let ticker = normalize_key(row.get("ticker")).unwrap_or_default();
                let company = row.get("company").to_string();
                let expected = companies.get(&ticker)?;
                let expected = expected.trim();
                if expected.is_empty()
                    || company.trim().to_lowercase() == expected.to_lowercase()
                {
                    None
                } else {
                    Some(format!(
                        "company mismatch for ticker {ticker}: expected {expected}"
                    ))
                }
            }
        }
    }

    fn track(&mut self, column: &str, kind: &'static str, key: String) -> Option<String> {
        let seen = self.seen.entry((column.to_string(), kind)).or_default();
        if seen.contains(&key) {
            return Some(format!("duplicate value {key}"));
        }
        seen.insert(key);
        None
    }
}

fn numeric_check(value: &Value, ok: impl Fn(f64) -> bool, message: &str) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match value.as_f64() {
        Some(number) if ok(number) => None,
        Some(number) => Some(format!("{message} ({number})")),
        None => Some(format!("not numeric ({value})")),
    }
}
