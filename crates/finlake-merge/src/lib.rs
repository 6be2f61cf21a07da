//! Staged merge of periodized raw tables.
//!
//! Sources are discovered per table, concatenated, validated with the rule
//! engine, deduplicated on their entity key and persisted as
//! `merged_/valid_/invalid_<table>.csv` inside the run directory. The base
//! table gates every later stage; the KPI stage runs last.

pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod prepare;
pub mod report;
pub mod sources;

pub use errors::MergeError;
pub use loader::{CsvWarehouse, LoadError, LoadStats, WarehouseLoader};
pub use orchestrator::{FACT_KEYS, MergeOptions, MergeOrchestrator, MergeOutcome, dedupe_valid};
pub use report::{KpiOutcome, LoadOutcome, MergeReport, REPORT_FILE, RunStatus, TableOutcome, TableReport};
pub use sources::{SourceFile, SourceLayout, Stage, TableSource, default_sources};
