use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use regex::Regex;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Declared type of a column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Float,
    Integer,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Float => "float",
            ColumnType::Integer => "integer",
            ColumnType::Date => "date",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Float | ColumnType::Integer)
    }
}

/// Raw rule document as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RuleConfig {
    /// Table name to column declarations.
    pub tables: BTreeMap<String, BTreeMap<String, ColumnRuleConfig>>,
}

/// Emit the JSON Schema for the rule configuration document.
pub fn rule_config_json_schema() -> RootSchema {
    schema_for!(RuleConfig)
}

/// Raw column declaration: a type plus ordered constraint directives.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnRuleConfig {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Directives such as `not_null`, `pattern:^[A-Z]+$` or
    /// `referential:stocks_raw.ticker`.
    #[serde(default)]
    pub rules: Vec<String>,
}

/// A compiled constraint directive.
#[derive(Debug, Clone)]
pub enum Constraint {
    NotNull,
    Nullable,
    Positive,
    NonNegative,
    Unique,
    UniqueTrimmed,
    IsoDate,
    Pattern { source: String, regex: Regex },
    InRange { min: f64, max: f64 },
    Referential { table: String, column: String },
    MatchCompanyForTicker { table: String },
    UppercaseTrim,
}

impl Constraint {
    /// Parse one directive string.
    pub fn parse(directive: &str) -> Result<Self> {
        let directive = directive.trim();
        let (name, arg) = match directive.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (directive, None),
        };

        let constraint = match (name, arg) {
            ("not_null", None) => Constraint::NotNull,
            ("nullable", None) => Constraint::Nullable,
            ("positive", None) => Constraint::Positive,
            ("non_negative", None) => Constraint::NonNegative,
            ("unique", None) => Constraint::Unique,
            ("unique_trimmed", None) => Constraint::UniqueTrimmed,
            ("iso_date", None) => Constraint::IsoDate,
            ("uppercase_trim", None) => Constraint::UppercaseTrim,
            ("pattern", Some(source)) => {
                // Patterns only anchor at the start of the value.
                let regex = Regex::new(&format!("^(?:{source})")).map_err(|err| {
                    CoreError::InvalidRule(format!("invalid pattern '{source}': {err}"))
                })?;
                Constraint::Pattern {
                    source: source.to_string(),
                    regex,
                }
            }
            ("in_range", Some(range)) => {
                let (min, max) = range.split_once(':').ok_or_else(|| {
                    CoreError::InvalidRule(format!("in_range expects min:max, got '{range}'"))
                })?;
                let min = parse_bound(min, directive)?;
                let max = parse_bound(max, directive)?;
                if min > max {
                    return Err(CoreError::InvalidRule(format!(
                        "in_range lower bound exceeds upper bound: {directive}"
                    )));
                }
                Constraint::InRange { min, max }
            }
            ("referential", Some(target)) => {
                let (table, column) = target
                    .split_once('.')
                    .filter(|(table, column)| !table.is_empty() && !column.is_empty())
                    .ok_or_else(|| {
                        CoreError::InvalidRule(format!(
                            "referential expects <table>.<column>, got '{target}'"
                        ))
                    })?;
                Constraint::Referential {
                    table: table.to_string(),
                    column: column.to_string(),
                }
            }
            ("match_company_for_ticker", Some(table)) if !table.is_empty() => {
                Constraint::MatchCompanyForTicker {
                    table: table.to_string(),
                }
            }
            _ => {
                return Err(CoreError::InvalidRule(format!(
                    "unknown directive: {directive}"
                )));
            }
        };
        Ok(constraint)
    }

    /// Stable short code used in structured failures.
    pub fn code(&self) -> &'static str {
        match self {
            Constraint::NotNull => "not_null",
            Constraint::Nullable => "nullable",
            Constraint::Positive => "positive",
            Constraint::NonNegative => "non_negative",
            Constraint::Unique => "unique",
            Constraint::UniqueTrimmed => "unique_trimmed",
            Constraint::IsoDate => "iso_date",
            Constraint::Pattern { .. } => "pattern",
            Constraint::InRange { .. } => "in_range",
            Constraint::Referential { .. } => "referential",
            Constraint::MatchCompanyForTicker { .. } => "match_company_for_ticker",
            Constraint::UppercaseTrim => "uppercase_trim",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Pattern { source, .. } => write!(f, "pattern:{source}"),
            Constraint::InRange { min, max } => write!(f, "in_range:{min}:{max}"),
            Constraint::Referential { table, column } => {
                write!(f, "referential:{table}.{column}")
            }
            Constraint::MatchCompanyForTicker { table } => {
                write!(f, "match_company_for_ticker:{table}")
            }
            other => f.write_str(other.code()),
        }
    }
}

fn parse_bound(raw: &str, directive: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CoreError::InvalidRule(format!("invalid in_range bound '{raw}': {directive}")))
}

/// Compiled rules for one column.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub name: String,
    pub column_type: ColumnType,
    pub constraints: Vec<Constraint>,
}

impl ColumnRule {
    pub fn has(&self, code: &str) -> bool {
        self.constraints.iter().any(|c| c.code() == code)
    }
}

/// Compiled rules for one table, ordered by column name.
#[derive(Debug, Clone)]
pub struct TableRules {
    pub name: String,
    pub columns: Vec<ColumnRule>,
}

impl TableRules {
    pub fn column(&self, name: &str) -> Option<&ColumnRule> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

/// Immutable set of table rules loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    tables: BTreeMap<String, TableRules>,
}

impl RuleCatalog {
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for (table, columns) in &config.tables {
            let mut compiled = Vec::with_capacity(columns.len());
            for (column, declaration) in columns {
                let constraints = declaration
                    .rules
                    .iter()
                    .map(|directive| {
                        Constraint::parse(directive).map_err(|err| match err {
                            CoreError::InvalidRule(msg) => {
                                CoreError::InvalidRule(format!("{table}.{column}: {msg}"))
                            }
                            other => other,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                compiled.push(ColumnRule {
                    name: column.clone(),
                    column_type: declaration.column_type,
                    constraints,
                });
            }
            tables.insert(
                table.clone(),
                TableRules {
                    name: table.clone(),
                    columns: compiled,
                },
            );
        }
        Ok(Self { tables })
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: RuleConfig = serde_json::from_str(raw)?;
        Self::from_config(&config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn table(&self, name: &str) -> Result<&TableRules> {
        self.tables
            .get(name)
            .ok_or_else(|| CoreError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRules> {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameterised_directives() {
        let range = Constraint::parse("in_range:-5:10.5").expect("range");
        assert!(matches!(range, Constraint::InRange { min, max } if min == -5.0 && max == 10.5));

        let reference = Constraint::parse("referential:stocks_raw.ticker").expect("referential");
        assert_eq!(reference.to_string(), "referential:stocks_raw.ticker");

        let pattern = Constraint::parse("pattern:[A-Z]{1,5}").expect("pattern");
        let Constraint::Pattern { regex, .. } = pattern else {
            panic!("expected pattern");
        };
        assert!(regex.is_match("AAPL123"));
        assert!(!regex.is_match("aapl"));
    }

    #[test]
    fn rejects_unknown_and_malformed_directives() {
        assert!(Constraint::parse("sometimes_null").is_err());
        assert!(Constraint::parse("referential:stocks_raw").is_err());
        assert!(Constraint::parse("in_range:1").is_err());
        assert!(Constraint::parse("in_range:5:1").is_err());
        assert!(Constraint::parse("pattern:(").is_err());
    }
}
