//! KPI and analytics engine.
//!
//! Reads the valid partitions written by the merge stage and derives four
//! fact tables: `stock_facts`, `macro_facts`, `sector_lookup` and
//! `analytics_summary`. Every table is recomputed in full on each run.

pub mod engine;
pub mod errors;
pub mod inputs;
pub mod model;
pub mod stats;

pub use engine::{KpiEngine, KpiOptions, YearlyMacro, daily_return, parse_quarter_label};
pub use errors::KpiError;
pub use inputs::{KpiInputs, StockRow};
pub use model::{AnalyticsSummary, FactTables, MacroFact, SectorLookup, StockFact};
