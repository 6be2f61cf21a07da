use std::path::Path;

use chrono::NaiveDate;
use finlake_core::{Dataset, ExecutionContext, Record, read_csv};
use tracing::{info, warn};

use crate::errors::KpiError;

pub const STOCKS_TABLE: &str = "stocks_raw";
pub const MACRO_TABLE: &str = "macro_raw";
pub const COMPANY_TABLE: &str = "company_metadata";
pub const EXCHANGE_TABLE: &str = "exchange_rates";

/// Macro indicators averaged per year, in output order.
pub const MACRO_INDICATORS: [&str; 8] = [
    "GDP",
    "inflation",
    "unemployment",
    "interest_rate",
    "consumer_spending",
    "industrial_production",
    "housing_starts",
    "retail_sales",
];

/// The four mandatory valid partitions.
#[derive(Debug, Clone)]
pub struct KpiInputs {
    pub stocks: Dataset,
    pub macro_data: Dataset,
    pub companies: Dataset,
    pub exchange: Dataset,
}

impl KpiInputs {
    /// Read `valid_<table>.csv` for every mandatory table of the run.
    pub fn load(ctx: &ExecutionContext) -> Result<Self, KpiError> {
        Ok(Self {
            stocks: load_table(&ctx.valid_path(STOCKS_TABLE), STOCKS_TABLE)?,
            macro_data: load_table(&ctx.valid_path(MACRO_TABLE), MACRO_TABLE)?,
            companies: load_table(&ctx.valid_path(COMPANY_TABLE), COMPANY_TABLE)?,
            exchange: load_table(&ctx.valid_path(EXCHANGE_TABLE), EXCHANGE_TABLE)?,
        })
    }
}

fn load_table(path: &Path, table: &str) -> Result<Dataset, KpiError> {
    if !path.exists() {
        return Err(KpiError::MissingInput(path.to_path_buf()));
    }
    let dataset = read_csv(path)?;
    if dataset.is_empty() {
        return Err(KpiError::EmptyInput(table.to_string()));
    }
    info!(table = %table, rows = dataset.len(), "loaded kpi input");
    Ok(dataset)
}

pub(crate) fn require_columns(
    dataset: &Dataset,
    table: &str,
    columns: &[&str],
) -> Result<(), KpiError> {
    for column in columns {
        if !dataset.has_column(column) {
            return Err(KpiError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// One validated stock price row.
#[derive(Debug, Clone)]
pub struct StockRow {
    pub ticker: String,
    pub company: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

pub fn stock_rows(dataset: &Dataset) -> Result<Vec<StockRow>, KpiError> {
    require_columns(
        dataset,
        STOCKS_TABLE,
        &["ticker", "company", "date", "open", "high", "low", "close", "volume"],
    )?;

    let mut rows = Vec::with_capacity(dataset.len());
    for (idx, record) in dataset.records().enumerate() {
        let Some(date) = record.value("date").as_date() else {
            warn!(table = STOCKS_TABLE, row = idx, "skipping row without a usable date");
            continue;
        };
        rows.push(StockRow {
            ticker: text(&record, "ticker"),
            company: text(&record, "company"),
            date,
            open: number(&record, "open"),
            high: number(&record, "high"),
            low: number(&record, "low"),
            close: number(&record, "close"),
            volume: record
                .value("volume")
                .as_i64()
                .or_else(|| record.value("volume").as_f64().map(|v| v as i64))
                .unwrap_or(0),
        });
    }
    Ok(rows)
}

pub(crate) fn text(record: &Record<'_>, column: &str) -> String {
    record.value(column).to_string()
}

pub(crate) fn optional_text(record: &Record<'_>, column: &str) -> Option<String> {
    let value = record.value(column);
    (!value.is_null()).then(|| value.to_string())
}

pub(crate) fn number(record: &Record<'_>, column: &str) -> f64 {
    record.value(column).as_f64().unwrap_or(f64::NAN)
}

pub(crate) fn optional_number(record: &Record<'_>, column: &str) -> Option<f64> {
    record.value(column).as_f64().filter(|v| v.is_finite())
}
