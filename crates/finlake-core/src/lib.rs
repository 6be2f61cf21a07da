//! Core contracts shared by the finlake pipeline.
//!
//! This crate defines the dataset model (values, rows, tables of rows), the
//! typed rule catalog compiled from the JSON rule configuration, the execution
//! context of a run, and the CSV helpers every stage uses to read and persist
//! partitions.

pub mod context;
pub mod csv_io;
pub mod dataset;
pub mod dedupe;
pub mod error;
pub mod rules;
pub mod validation;
pub mod value;

pub use context::{ExecutionContext, RunMode};
pub use csv_io::{read_csv, read_csv_from, records_to_dataset, write_csv};
pub use dataset::{Dataset, Record, Row};
pub use dedupe::dedupe_keep_last;
pub use error::{CoreError, Result};
pub use rules::{
    ColumnRule, ColumnRuleConfig, ColumnType, Constraint, RuleCatalog, RuleConfig, TableRules,
    rule_config_json_schema,
};
pub use validation::validate_catalog;
pub use value::{Value, parse_date};

/// Current contract version for rule configuration documents.
pub const RULES_VERSION: &str = "0.1";
