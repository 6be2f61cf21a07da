use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Datelike;
use finlake_core::{Dataset, ExecutionContext, dedupe_keep_last};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::KpiError;
use crate::inputs::{
    COMPANY_TABLE, EXCHANGE_TABLE, KpiInputs, MACRO_INDICATORS, MACRO_TABLE, StockRow,
    optional_number, optional_text, require_columns, stock_rows, text,
};
use crate::model::{AnalyticsSummary, FactTables, MacroFact, SectorLookup, StockFact};
use crate::stats::{dense_rank_desc, finite_or_zero, mean_f64, pearson, rolling_mean, rolling_std};

/// Rolling window sizes, in observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiOptions {
    pub volatility_window: usize,
    pub short_window: usize,
    pub long_window: usize,
    pub volume_window: usize,
}

impl Default for KpiOptions {
    fn default() -> Self {
        Self {
            volatility_window: 30,
            short_window: 30,
            long_window: 90,
            volume_window: 30,
        }
    }
}

/// Yearly macro aggregates shared by macro_facts and analytics_summary.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyMacro {
    pub year: i32,
    pub avg_gdp: Option<f64>,
    pub avg_inflation: Option<f64>,
    pub gdp_growth: f64,
    pub inflation_trend: f64,
    pub is_recession: bool,
}

/// Computes derived fact tables from the valid partitions of a run.
#[derive(Debug, Clone, Default)]
pub struct KpiEngine {
    options: KpiOptions,
}

impl KpiEngine {
    pub fn new(options: KpiOptions) -> Self {
        Self { options }
    }

    /// Load the valid partitions of `ctx`, compute every fact table and write
    /// them next to the partitions.
    pub fn compute_facts(&self, ctx: &ExecutionContext) -> Result<FactTables, KpiError> {
        info!(event = "kpi_started", dir = %ctx.dir.display(), "starting kpi calculations");
        let inputs = KpiInputs::load(ctx)?;
        let facts = self.compute(&inputs, ctx.mode.start().year())?;
        facts.write_all(&ctx.dir)?;
        info!(
            event = "kpi_finished",
            stock_facts = facts.stock_facts.len(),
            macro_facts = facts.macro_facts.len(),
            sectors = facts.sector_lookup.len(),
            analytics = facts.analytics_summary.len(),
            "kpi calculations completed"
        );
        Ok(facts)
    }

    /// Compute fact tables in memory. Bare `Qn` macro labels are dated to
    /// `fallback_year`.
    pub fn compute(&self, inputs: &KpiInputs, fallback_year: i32) -> Result<FactTables, KpiError> {
        let stock_facts = self.stock_facts(&stock_rows(&inputs.stocks)?);
        info!(rows = stock_facts.len(), "stock facts calculated");

        let (macro_facts, yearly) = macro_facts(&inputs.macro_data, fallback_year)?;
        info!(rows = macro_facts.len(), years = yearly.len(), "macro facts calculated");

        let sector_lookup = sector_lookup(&inputs.companies)?;
        info!(sectors = sector_lookup.len(), "sector lookup created");

        let exchange = yearly_exchange_rates(&inputs.exchange)?;
        let analytics_summary = analytics_summary(
            &stock_facts,
            &inputs.companies,
            &sector_lookup,
            &yearly,
            &exchange,
        )?;
        info!(rows = analytics_summary.len(), "analytics summary calculated");

        Ok(FactTables {
            stock_facts,
            macro_facts,
            sector_lookup,
            analytics_summary,
        })
    }

    /// Per-ticker returns, rolling volatility and moving averages, sorted by
    /// ticker then date.
    pub fn stock_facts(&self, rows: &[StockRow]) -> Vec<StockFact> {
        let mut rows = rows.to_vec();
        rows.sort_by(|a, b| (a.ticker.as_str(), a.date).cmp(&(b.ticker.as_str(), b.date)));

        let mut facts = Vec::with_capacity(rows.len());
        for group in rows.chunk_by(|a, b| a.ticker == b.ticker) {
            let closes: Vec<f64> = group.iter().map(|row| row.close).collect();
            let volumes: Vec<f64> = group.iter().map(|row| row.volume as f64).collect();
            let returns: Vec<f64> = closes
                .iter()
                .enumerate()
                .map(|(idx, close)| {
                    let previous = idx.checked_sub(1).map(|prev| closes[prev]);
                    daily_return(previous, *close)
                })
                .collect();

            let volatility = rolling_std(&returns, self.options.volatility_window);
            let short = rolling_mean(&closes, self.options.short_window);
            let long = rolling_mean(&closes, self.options.long_window);
            let volume_avg = rolling_mean(&volumes, self.options.volume_window);

            for (idx, row) in group.iter().enumerate() {
                facts.push(StockFact {
                    ticker: row.ticker.clone(),
                    company: row.company.clone(),
                    date: row.date,
                    open: finite_or_zero(row.open),
                    high: finite_or_zero(row.high),
                    low: finite_or_zero(row.low),
                    close: finite_or_zero(row.close),
                    volume: row.volume,
                    daily_return: returns[idx],
                    volatility_30d: finite_or_zero(volatility[idx]),
                    moving_avg_30d: finite_or_zero(short[idx]),
                    moving_avg_90d: finite_or_zero(long[idx]),
                    trading_volume_avg: finite_or_zero(volume_avg[idx]),
                    price_range: finite_or_zero(row.high - row.low),
                    year: row.date.year(),
                    month: row.date.month(),
                    quarter: quarter_of(row.date.month()),
                });
            }
        }
        facts
    }
}

/// Percentage change from the previous close; zero without a usable previous close.
pub fn daily_return(previous: Option<f64>, close: f64) -> f64 {
    match previous {
        Some(prev) if prev != 0.0 && prev.is_finite() => {
            finite_or_zero((close - prev) / prev * 100.0)
        }
        _ => 0.0,
    }
}

fn quarter_of(month: u32) -> u32 {
    (month.saturating_sub(1)) / 3 + 1
}

/// Parse `YYYY-Qn` or a bare `Qn` dated to `fallback_year`.
pub fn parse_quarter_label(label: &str, fallback_year: i32) -> Option<(i32, u32)> {
    let label = label.trim();
    let (year, quarter) = match label.split_once('-') {
        Some((year, quarter)) => (year.trim().parse::<i32>().ok()?, quarter),
        None => (fallback_year, label),
    };
    let quarter = quarter
        .trim()
        .strip_prefix(['Q', 'q'])?
        .parse::<u32>()
        .ok()
        .filter(|q| (1..=4).contains(q))?;
    Some((year, quarter))
}

struct QuarterRow {
    label: String,
    year: i32,
    quarter: u32,
    indicators: [Option<f64>; 8],
}

/// Quarterly macro rows joined with yearly growth, trend and recession flags.
pub fn macro_facts(
    dataset: &Dataset,
    fallback_year: i32,
) -> Result<(Vec<MacroFact>, Vec<YearlyMacro>), KpiError> {
    require_columns(dataset, MACRO_TABLE, &["quarter"])?;

    let mut rows = Vec::with_capacity(dataset.len());
    for (idx, record) in dataset.records().enumerate() {
        let label = text(&record, "quarter");
        let Some((year, quarter)) = parse_quarter_label(&label, fallback_year) else {
            warn!(table = MACRO_TABLE, row = idx, label = %label, "unrecognised quarter label");
            continue;
        };
        let indicators = MACRO_INDICATORS.map(|column| optional_number(&record, column));
        rows.push(QuarterRow {
            label,
            year,
            quarter,
            indicators,
        });
    }

    let yearly = yearly_macro(&rows);
    let by_year: HashMap<i32, &YearlyMacro> = yearly.iter().map(|y| (y.year, y)).collect();

    let facts = rows
        .iter()
        .map(|row| {
            let year = by_year.get(&row.year);
            let value = |idx: usize| row.indicators[idx].unwrap_or(0.0);
            MacroFact {
                quarter: row.label.clone(),
                year: row.year,
                quarter_num: row.quarter,
                gdp: value(0),
                inflation: value(1),
                unemployment: value(2),
                interest_rate: value(3),
                consumer_spending: value(4),
                industrial_production: value(5),
                housing_starts: value(6),
                retail_sales: value(7),
                gdp_growth: year.map(|y| y.gdp_growth).unwrap_or(0.0),
                inflation_trend: year.map(|y| y.inflation_trend).unwrap_or(0.0),
                is_recession: year.is_some_and(|y| y.is_recession) as u8,
            }
        })
        .collect();

    Ok((facts, yearly))
}

fn yearly_macro(rows: &[QuarterRow]) -> Vec<YearlyMacro> {
    let mut samples: BTreeMap<i32, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in rows {
        let entry = samples.entry(row.year).or_default();
        if let Some(gdp) = row.indicators[0] {
            entry.0.push(gdp);
        }
        if let Some(inflation) = row.indicators[1] {
            entry.1.push(inflation);
        }
    }

    let mut yearly: Vec<YearlyMacro> = Vec::with_capacity(samples.len());
    for (year, (gdp, inflation)) in samples {
        let avg_gdp = (!gdp.is_empty()).then(|| mean_f64(&gdp));
        let avg_inflation = (!inflation.is_empty()).then(|| mean_f64(&inflation));
        let previous = yearly.last();

        let gdp_growth = match (previous.and_then(|p| p.avg_gdp), avg_gdp) {
            (Some(prev), Some(current)) if prev != 0.0 => {
                finite_or_zero((current - prev) / prev * 100.0)
            }
            _ => 0.0,
        };
        let inflation_trend = match (previous.and_then(|p| p.avg_inflation), avg_inflation) {
            (Some(prev), Some(current)) => finite_or_zero(current - prev),
            _ => 0.0,
        };

        yearly.push(YearlyMacro {
            year,
            avg_gdp,
            avg_inflation,
            gdp_growth,
            inflation_trend,
            is_recession: gdp_growth < 0.0,
        });
    }
    yearly
}

/// Distinct industries in first-seen order with sequential ids and a
/// four-letter code.
pub fn sector_lookup(companies: &Dataset) -> Result<Vec<SectorLookup>, KpiError> {
    require_columns(companies, COMPANY_TABLE, &["industry"])?;

    let mut seen = HashSet::new();
    let mut sectors = Vec::new();
    for record in companies.records() {
        let Some(name) = optional_text(&record, "industry") else {
            continue;
        };
        if !seen.insert(name.clone()) {
            continue;
        }
        // Codes are not disambiguated when two sectors share a prefix.
        let sector_code = name.chars().take(4).collect::<String>().to_uppercase();
        sectors.push(SectorLookup {
            sector_id: sectors.len() as u32 + 1,
            sector_name: name,
            sector_code,
        });
    }
    Ok(sectors)
}

/// Mean USD/INR rate per calendar year.
pub fn yearly_exchange_rates(exchange: &Dataset) -> Result<HashMap<i32, f64>, KpiError> {
    require_columns(exchange, EXCHANGE_TABLE, &["date", "usd_inr_rate"])?;

    let mut samples: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for record in exchange.records() {
        let Some(date) = record.value("date").as_date() else {
            continue;
        };
        let entry = samples.entry(date.year()).or_default();
        if let Some(rate) = optional_number(&record, "usd_inr_rate") {
            entry.push(rate);
        }
    }

    Ok(samples
        .into_iter()
        .map(|(year, rates)| (year, finite_or_zero(mean_f64(&rates))))
        .collect())
}

#[derive(Default)]
struct QuarterAccumulator {
    returns: Vec<f64>,
    volatility: Vec<f64>,
    closes: Vec<f64>,
    volume: i64,
}

/// Quarterly per-ticker aggregates with sector benchmarks, macro
/// correlations and recession resilience.
pub fn analytics_summary(
    stock_facts: &[StockFact],
    companies: &Dataset,
    sectors: &[SectorLookup],
    yearly: &[YearlyMacro],
    exchange: &HashMap<i32, f64>,
) -> Result<Vec<AnalyticsSummary>, KpiError> {
    require_columns(companies, COMPANY_TABLE, &["ticker", "industry"])?;

    let codes: HashMap<&str, &str> = sectors
        .iter()
        .map(|s| (s.sector_name.as_str(), s.sector_code.as_str()))
        .collect();
    let mut ticker_sector: HashMap<String, (String, String)> = HashMap::new();
    for record in companies.records() {
        let Some(ticker) = optional_text(&record, "ticker") else {
            continue;
        };
        match optional_text(&record, "industry") {
            Some(name) => {
                let code = codes.get(name.as_str()).copied().unwrap_or_default().to_string();
                ticker_sector.insert(ticker, (name, code));
            }
            None => {
                ticker_sector.remove(&ticker);
            }
        }
    }

    let by_year: HashMap<i32, &YearlyMacro> = yearly.iter().map(|y| (y.year, y)).collect();

    let mut groups: BTreeMap<(String, String, i32, u32), QuarterAccumulator> = BTreeMap::new();
    for fact in stock_facts {
        let acc = groups
            .entry((fact.ticker.clone(), fact.company.clone(), fact.year, fact.quarter))
            .or_default();
        acc.returns.push(fact.daily_return);
        acc.volatility.push(fact.volatility_30d);
        acc.closes.push(fact.close);
        acc.volume = acc.volume.saturating_add(fact.volume);
    }

    let correlations = ticker_correlations(stock_facts, &by_year, exchange);
    let resilience = recession_resilience(stock_facts, &by_year);

    let mut rows: Vec<AnalyticsSummary> = groups
        .into_iter()
        .map(|((ticker, company, year, quarter), acc)| {
            let sector = ticker_sector.get(&ticker).cloned();
            let (correlation_gdp, correlation_inflation, currency_impact) =
                correlations.get(&ticker).copied().unwrap_or_default();
            AnalyticsSummary {
                sector_name: sector.as_ref().map(|(name, _)| name.clone()),
                sector_code: sector.map(|(_, code)| code),
                year,
                quarter,
                avg_return: finite_or_zero(mean_f64(&acc.returns)),
                avg_volatility: finite_or_zero(mean_f64(&acc.volatility)),
                avg_close: finite_or_zero(mean_f64(&acc.closes)),
                total_volume: acc.volume,
                correlation_gdp,
                correlation_inflation,
                currency_impact,
                sector_rank: 0,
                sector_avg_return: 0.0,
                outperforming_sector: 0,
                recession_resilience_score: resilience.get(&ticker).copied().unwrap_or(0.0),
                ticker,
                company,
            }
        })
        .collect();

    apply_sector_benchmarks(&mut rows);

    let before = rows.len();
    let rows = dedupe_keep_last(rows, |row| (row.ticker.clone(), row.year, row.quarter));
    if rows.len() < before {
        info!(
            removed = before - rows.len(),
            "removed duplicate analytics rows on ticker-year-quarter"
        );
    }
    Ok(rows)
}

/// Sector mean return, dense rank within (sector, year, quarter) and the
/// outperformance flag. Rows without a sector keep zeros.
fn apply_sector_benchmarks(rows: &mut [AnalyticsSummary]) {
    let mut periods: HashMap<(String, i32, u32), Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        if let Some(sector) = &row.sector_name {
            periods
                .entry((sector.clone(), row.year, row.quarter))
                .or_default()
                .push(idx);
        }
    }

    for members in periods.values() {
        let returns: Vec<f64> = members.iter().map(|idx| rows[*idx].avg_return).collect();
        let sector_avg = finite_or_zero(mean_f64(&returns));
        let ranks = dense_rank_desc(&returns);
        for (idx, rank) in members.iter().zip(ranks) {
            let row = &mut rows[*idx];
            row.sector_rank = rank;
            row.sector_avg_return = sector_avg;
            row.outperforming_sector = (row.avg_return > sector_avg) as u8;
        }
    }
}

/// Pearson correlation of each ticker's daily return against yearly GDP,
/// inflation and exchange rate.
fn ticker_correlations(
    stock_facts: &[StockFact],
    by_year: &HashMap<i32, &YearlyMacro>,
    exchange: &HashMap<i32, f64>,
) -> HashMap<String, (f64, f64, f64)> {
    let mut by_ticker: BTreeMap<&str, Vec<&StockFact>> = BTreeMap::new();
    for fact in stock_facts {
        by_ticker.entry(fact.ticker.as_str()).or_default().push(fact);
    }

    by_ticker
        .into_iter()
        .map(|(ticker, facts)| {
            let values = if facts.len() > 1 {
                (
                    correlate(&facts, |f| by_year.get(&f.year).and_then(|y| y.avg_gdp)),
                    correlate(&facts, |f| by_year.get(&f.year).and_then(|y| y.avg_inflation)),
                    correlate(&facts, |f| exchange.get(&f.year).copied()),
                )
            } else {
                (0.0, 0.0, 0.0)
            };
            (ticker.to_string(), values)
        })
        .collect()
}

fn correlate<F>(facts: &[&StockFact], series: F) -> f64
where
    F: Fn(&StockFact) -> Option<f64>,
{
    let (returns, other): (Vec<f64>, Vec<f64>) = facts
        .iter()
        .filter_map(|fact| series(*fact).map(|value| (fact.daily_return, value)))
        .unzip();
    if returns.len() <= 2 {
        return 0.0;
    }
    pearson(&returns, &other).map(finite_or_zero).unwrap_or(0.0)
}

/// Mean daily return per ticker over recession years.
fn recession_resilience(
    stock_facts: &[StockFact],
    by_year: &HashMap<i32, &YearlyMacro>,
) -> HashMap<String, f64> {
    let mut returns: HashMap<String, Vec<f64>> = HashMap::new();
    for fact in stock_facts {
        if by_year.get(&fact.year).is_some_and(|y| y.is_recession) {
            returns
                .entry(fact.ticker.clone())
                .or_default()
                .push(fact.daily_return);
        }
    }

    if returns.is_empty() {
        warn!("no recession periods found in data, resilience scores set to 0");
    }

    returns
        .into_iter()
        .map(|(ticker, values)| (ticker, finite_or_zero(mean_f64(&values))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_return_is_percentage_change() {
        assert_eq!(daily_return(Some(100.0), 110.0), 10.0);
        assert_eq!(daily_return(Some(0.0), 110.0), 0.0);
        assert_eq!(daily_return(None, 110.0), 0.0);
    }

    #[test]
    fn quarter_labels_with_and_without_year() {
        assert_eq!(parse_quarter_label("2023-Q4", 2024), Some((2023, 4)));
        assert_eq!(parse_quarter_label("Q2", 2024), Some((2024, 2)));
        assert_eq!(parse_quarter_label("Q5", 2024), None);
        assert_eq!(parse_quarter_label("2023", 2024), None);
    }
}
