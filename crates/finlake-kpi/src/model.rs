use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use finlake_core::{Dataset, records_to_dataset};
use serde::{Deserialize, Serialize};

use crate::errors::KpiError;

/// Per ticker-date price metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockFact {
    pub ticker: String,
    pub company: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub daily_return: f64,
    pub volatility_30d: f64,
    pub moving_avg_30d: f64,
    pub moving_avg_90d: f64,
    pub trading_volume_avg: f64,
    pub price_range: f64,
    pub year: i32,
    pub month: u32,
    pub quarter: u32,
}

/// Per quarter macro indicators with yearly growth fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroFact {
    pub quarter: String,
    pub year: i32,
    pub quarter_num: u32,
    #[serde(rename = "GDP")]
    pub gdp: f64,
    pub inflation: f64,
    pub unemployment: f64,
    pub interest_rate: f64,
    pub consumer_spending: f64,
    pub industrial_production: f64,
    pub housing_starts: f64,
    pub retail_sales: f64,
    pub gdp_growth: f64,
    pub inflation_trend: f64,
    pub is_recession: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectorLookup {
    pub sector_id: u32,
    pub sector_name: String,
    pub sector_code: String,
}

/// Per ticker-year-quarter analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsSummary {
    pub ticker: String,
    pub company: String,
    pub sector_name: Option<String>,
    pub sector_code: Option<String>,
    pub year: i32,
    pub quarter: u32,
    pub avg_return: f64,
    pub avg_volatility: f64,
    pub avg_close: f64,
    pub total_volume: i64,
    pub correlation_gdp: f64,
    pub correlation_inflation: f64,
    pub currency_impact: f64,
    pub sector_rank: u32,
    pub sector_avg_return: f64,
    pub outperforming_sector: u8,
    pub recession_resilience_score: f64,
}

/// The four derived fact tables of one run.
#[derive(Debug, Clone, Default)]
pub struct FactTables {
    pub stock_facts: Vec<StockFact>,
    pub macro_facts: Vec<MacroFact>,
    pub sector_lookup: Vec<SectorLookup>,
    pub analytics_summary: Vec<AnalyticsSummary>,
}

impl FactTables {
    pub const NAMES: [&'static str; 4] = [
        "stock_facts",
        "macro_facts",
        "sector_lookup",
        "analytics_summary",
    ];

    /// Write `<table>.csv` for every fact table into `dir`.
    pub fn write_all(&self, dir: &Path) -> Result<Vec<PathBuf>, KpiError> {
        Ok(vec![
            write_records(&dir.join("stock_facts.csv"), &self.stock_facts)?,
            write_records(&dir.join("macro_facts.csv"), &self.macro_facts)?,
            write_records(&dir.join("sector_lookup.csv"), &self.sector_lookup)?,
            write_records(&dir.join("analytics_summary.csv"), &self.analytics_summary)?,
        ])
    }

    /// Fact tables as generic datasets, keyed by table name.
    pub fn datasets(&self) -> Result<Vec<(&'static str, Dataset)>, KpiError> {
        Ok(vec![
            ("stock_facts", records_to_dataset(&self.stock_facts)?),
            ("macro_facts", records_to_dataset(&self.macro_facts)?),
            ("sector_lookup", records_to_dataset(&self.sector_lookup)?),
            (
                "analytics_summary",
                records_to_dataset(&self.analytics_summary)?,
            ),
        ])
    }
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<PathBuf, KpiError> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}
