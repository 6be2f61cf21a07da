use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::path::PathBuf;

use finlake_core::{Dataset, ExecutionContext, dedupe_keep_last, write_csv};
use finlake_kpi::{FactTables, KpiEngine};
use finlake_rules::{References, RuleEngine, ValidationResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::MergeError;
use crate::loader::{WarehouseLoader, row_key};
use crate::prepare::build_candidate;
use crate::report::{KpiOutcome, LoadOutcome, MergeReport, RunStatus, TableReport};
use crate::sources::{Stage, TableSource};

/// Entity keys of the derived fact tables, used when loading them.
pub const FACT_KEYS: [(&str, &[&str]); 4] = [
    ("stock_facts", &["ticker", "date"]),
    ("macro_facts", &["quarter"]),
    ("sector_lookup", &["sector_id"]),
    ("analytics_summary", &["ticker", "year", "quarter"]),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Root under which every source directory lives.
    pub data_root: PathBuf,
    pub sources: Vec<TableSource>,
    /// Run the KPI stage after a successful base table.
    pub compute_kpis: bool,
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct MergeOutcome {
    pub report: MergeReport,
    /// Valid partitions by table, after dedupe.
    pub valid: BTreeMap<String, Dataset>,
    pub facts: Option<FactTables>,
}

/// Runs the staged merge: base table, dependent tables, independent tables,
/// live-only tables, then the KPI stage.
pub struct MergeOrchestrator {
    engine: RuleEngine,
    options: MergeOptions,
    kpi: KpiEngine,
    loader: Option<Box<dyn WarehouseLoader>>,
}

impl MergeOrchestrator {
    /// Check the source list against the rule catalog.
    ///
    /// Exactly one base table is required, every source needs a schema and
    /// entity keys must name schema columns.
    pub fn new(engine: RuleEngine, options: MergeOptions) -> Result<Self, MergeError> {
        let bases = options
            .sources
            .iter()
            .filter(|source| source.stage == Stage::Base)
            .count();
        if bases != 1 {
            return Err(MergeError::Config(format!(
                "expected exactly one base table, found {bases}"
            )));
        }

        let mut names = HashSet::new();
        for source in &options.sources {
            if !names.insert(source.name.as_str()) {
                return Err(MergeError::Config(format!(
                    "table {} is configured twice",
                    source.name
                )));
            }
            let rules = engine.catalog().table(&source.name).map_err(|_| {
                MergeError::Config(format!("no rules found for table {}", source.name))
            })?;
            if source.entity_key.is_empty() {
                return Err(MergeError::Config(format!(
                    "table {} has an empty entity key",
                    source.name
                )));
            }
            for column in &source.entity_key {
                if rules.column(column).is_none() {
                    return Err(MergeError::Config(format!(
                        "entity key column {}.{} has no rule declaration",
                        source.name, column
                    )));
                }
            }
        }

        Ok(Self {
            engine,
            options,
            kpi: KpiEngine::default(),
            loader: None,
        })
    }

    pub fn with_loader(mut self, loader: Box<dyn WarehouseLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_kpi_engine(mut self, kpi: KpiEngine) -> Self {
        self.kpi = kpi;
        self
    }

    /// Execute every stage for `ctx` and write `merge_report.json`.
    ///
    /// Only a failing base table aborts the run; other tables are skipped
    /// with a warning and the KPI stage failure is recorded in the report.
    pub fn run(&mut self, ctx: &ExecutionContext) -> Result<MergeOutcome, MergeError> {
        info!(
            event = "merge_started",
            run_id = %ctx.run_id,
            mode = ctx.mode.label(),
            start = %ctx.mode.start(),
            end = %ctx.mode.end(),
            dir = %ctx.dir.display(),
            "starting merge"
        );

        let mut report = MergeReport::new(ctx);
        let mut references = References::new();
        let mut valid = BTreeMap::new();

        let mut sources = self.options.sources.clone();
        sources.sort_by_key(|source| source.stage);

        for source in &sources {
            info!(table = %source.name, stage = source.stage.as_str(), "processing table");
            if source.stage == Stage::LiveOnly && !ctx.mode.is_live() {
                warn!(table = %source.name, "table is only available in live mode, skipping");
                report.tables.push(TableReport::skipped(
                    &source.name,
                    source.stage,
                    "only available in live mode",
                ));
                continue;
            }

            let refs = source.stage.uses_references().then_some(&references);
            match self.process_table(source, ctx, refs) {
                Ok((dataset, table_report)) => {
                    report.tables.push(table_report);
                    if source.stage == Stage::Base {
                        info!(
                            table = %source.name,
                            rows = dataset.len(),
                            "base table established"
                        );
                    }
                    if !dataset.is_empty() && source.stage != Stage::Independent {
                        references.insert(source.name.clone(), dataset.clone());
                    }
                    valid.insert(source.name.clone(), dataset);
                }
                Err(err) if source.stage == Stage::Base => {
                    error!(table = %source.name, error = %err, "base table failed, terminating pipeline");
                    report
                        .tables
                        .push(TableReport::skipped(&source.name, source.stage, err.to_string()));
                    report.finish(RunStatus::Failed);
                    report.write(&ctx.dir)?;
                    return Err(MergeError::BaseTableFailed {
                        table: source.name.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(table = %source.name, error = %err, "table not available, continuing without it");
                    report
                        .tables
                        .push(TableReport::skipped(&source.name, source.stage, err.to_string()));
                }
            }
        }

        let facts = if self.options.compute_kpis {
            self.kpi_stage(ctx, &mut report)
        } else {
            None
        };

        report.finish(RunStatus::Completed);
        report.write(&ctx.dir)?;
        info!(event = "merge_finished", run_id = %ctx.run_id, "merge completed");

        Ok(MergeOutcome {
            report,
            valid,
            facts,
        })
    }

    fn process_table(
        &mut self,
        source: &TableSource,
        ctx: &ExecutionContext,
        references: Option<&References>,
    ) -> Result<(Dataset, TableReport), MergeError> {
        let files = source.discover(&self.options.data_root, &ctx.mode)?;
        if files.is_empty() {
            return Err(MergeError::NoData(source.name.clone()));
        }
        let candidate = build_candidate(source, &files, &ctx.mode)?;
        write_csv(&ctx.merged_path(&source.name), &candidate.dataset)?;
        info!(
            table = %source.name,
            files = candidate.files_read,
            rows = candidate.dataset.len(),
            "merged source files"
        );

        let mut result = self
            .engine
            .validate(&candidate.dataset, &source.name, references)?;
        let duplicates = dedupe_valid(&mut result, &source.entity_key)?;
        if duplicates > 0 {
            info!(
                table = %source.name,
                removed = duplicates,
                key = %source.entity_key.join(","),
                "removed duplicate records"
            );
        }

        let valid = result.valid_dataset();
        write_csv(&ctx.valid_path(&source.name), &valid)?;
        write_csv(&ctx.invalid_path(&source.name), &result.invalid_dataset())?;
        let violations = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(ctx.violations_path(&source.name))?;
        serde_json::to_writer_pretty(violations, &result.failures)?;
        info!(
            table = %source.name,
            valid = result.valid_count(),
            invalid = result.invalid_count(),
            "partitions written"
        );

        let mut table_report = TableReport::new(&source.name, source.stage);
        table_report.files_read = candidate.files_read;
        table_report.merged_rows = candidate.dataset.len();
        table_report.valid_rows = result.valid_count();
        table_report.invalid_rows = result.invalid_count();
        table_report.duplicates_removed = duplicates;

        if valid.is_empty() {
            if source.stage == Stage::Base {
                return Err(MergeError::NoValidRows(source.name.clone()));
            }
            warn!(table = %source.name, "no valid rows");
            return Ok((valid, table_report));
        }

        table_report.load = self.load(&source.name, &source.entity_key, &valid);
        Ok((valid, table_report))
    }

    /// Load failures are logged and never invalidate the partition.
    fn load(&mut self, table: &str, key: &[String], rows: &Dataset) -> LoadOutcome {
        let Some(loader) = self.loader.as_mut() else {
            return LoadOutcome::NotLoaded;
        };
        match loader.load(table, key, rows) {
            Ok(stats) => {
                info!(
                    table = %table,
                    inserted = stats.inserted,
                    ignored = stats.ignored,
                    "loaded rows into warehouse"
                );
                LoadOutcome::Loaded(stats)
            }
            Err(err) => {
                error!(table = %table, error = %err, "failed to load table");
                LoadOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn kpi_stage(&mut self, ctx: &ExecutionContext, report: &mut MergeReport) -> Option<FactTables> {
        info!(event = "kpi_stage_started", "kpi calculations and fact table generation");
        let facts = match self.kpi.compute_facts(ctx) {
            Ok(facts) => facts,
            Err(err) => {
                error!(error = %err, "failed to calculate kpis");
                report.kpi = KpiOutcome::Failed {
                    reason: err.to_string(),
                };
                return None;
            }
        };

        let mut rows = BTreeMap::new();
        let mut loads = BTreeMap::new();
        match facts.datasets() {
            Ok(datasets) => {
                for (table, dataset) in datasets {
                    rows.insert(table.to_string(), dataset.len());
                    let key = fact_key(table);
                    let outcome = if dataset.is_empty() {
                        LoadOutcome::NotLoaded
                    } else {
                        self.load(table, &key, &dataset)
                    };
                    loads.insert(table.to_string(), outcome);
                }
            }
            Err(err) => {
                error!(error = %err, "failed to prepare fact tables for loading");
            }
        }

        report.kpi = KpiOutcome::Completed { rows, loads };
        Some(facts)
    }
}

fn fact_key(table: &str) -> Vec<String> {
    FACT_KEYS
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, key)| key.iter().map(|column| column.to_string()).collect())
        .unwrap_or_default()
}

/// Drop earlier valid rows sharing an entity key, returning how many went.
pub fn dedupe_valid(result: &mut ValidationResult, key: &[String]) -> Result<usize, MergeError> {
    let indices = key
        .iter()
        .map(|column| {
            result
                .columns
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| {
                    MergeError::Config(format!(
                        "entity key column {}.{} missing from validated rows",
                        result.table, column
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let before = result.valid.len();
    let rows = std::mem::take(&mut result.valid);
    result.valid = dedupe_keep_last(rows, |row| row_key(&row.coerced, &indices));
    Ok(before - result.valid.len())
}
