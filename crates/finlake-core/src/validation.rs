use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, Result};
use crate::rules::{Constraint, RuleCatalog};

/// Validate internal consistency of a rule catalog.
///
/// This checks:
/// - referential targets name a known table and column
/// - company match targets declare both `ticker` and `company`
/// - `in_range`/`positive`/`non_negative` only sit on numeric columns
pub fn validate_catalog(catalog: &RuleCatalog) -> Result<()> {
    let mut columns_by_table: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for table in catalog.tables() {
        columns_by_table.insert(table.name.as_str(), table.column_names().collect());
    }

    for table in catalog.tables() {
        for column in &table.columns {
            for constraint in &column.constraints {
                match constraint {
                    Constraint::Referential {
                        table: ref_table,
                        column: ref_column,
                    } => {
                        let ref_columns =
                            columns_by_table.get(ref_table.as_str()).ok_or_else(|| {
                                CoreError::InvalidRule(format!(
                                    "referenced table not found: {}.{} -> {}",
                                    table.name, column.name, ref_table
                                ))
                            })?;
                        if !ref_columns.contains(ref_column.as_str()) {
                            return Err(CoreError::InvalidRule(format!(
                                "referenced column not found: {}.{} -> {}.{}",
                                table.name, column.name, ref_table, ref_column
                            )));
                        }
                    }
                    Constraint::MatchCompanyForTicker { table: ref_table } => {
                        let ref_columns =
                            columns_by_table.get(ref_table.as_str()).ok_or_else(|| {
                                CoreError::InvalidRule(format!(
                                    "company match table not found: {}.{} -> {}",
                                    table.name, column.name, ref_table
                                ))
                            })?;
                        for required in ["ticker", "company"] {
                            if !ref_columns.contains(required) {
                                return Err(CoreError::InvalidRule(format!(
                                    "company match table {ref_table} lacks column {required}"
                                )));
                            }
                        }
                    }
                    Constraint::InRange { .. } | Constraint::Positive | Constraint::NonNegative => {
                        if !column.column_type.is_numeric() {
                            return Err(CoreError::InvalidRule(format!(
                                "{} requires a numeric column: {}.{} is {}",
                                constraint.code(),
                                table.name,
                                column.name,
                                column.column_type.as_str()
                            )));
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
