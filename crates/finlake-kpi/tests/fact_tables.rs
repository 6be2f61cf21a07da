use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use finlake_core::{Dataset, ExecutionContext, RunMode, read_csv_from};
use finlake_kpi::engine::{analytics_summary, macro_facts, sector_lookup};
use finlake_kpi::{KpiEngine, KpiError, KpiInputs, StockFact, YearlyMacro};

fn csv(data: &str) -> Dataset {
    read_csv_from(data.as_bytes()).expect("parse csv")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn fact(ticker: &str, day: NaiveDate, daily_return: f64) -> StockFact {
    StockFact {
        ticker: ticker.to_string(),
        company: format!("{ticker} Corp"),
        date: day,
        open: 10.0,
        high: 11.0,
        low: 9.0,
        close: 10.0,
        volume: 100,
        daily_return,
        volatility_30d: 0.0,
        moving_avg_30d: 10.0,
        moving_avg_90d: 10.0,
        trading_volume_avg: 100.0,
        price_range: 2.0,
        year: 2024,
        month: 1,
        quarter: 1,
    }
}

fn inputs() -> KpiInputs {
    KpiInputs {
        stocks: csv("ticker,company,date,open,high,low,close,volume\n\
             AAPL,Apple,2024-01-03,101,112,100,110,1000\n\
             AAPL,Apple,2024-01-02,99,101,98,100,900\n\
             MSFT,Microsoft,2024-01-02,0,1,0,0,10\n\
             MSFT,Microsoft,2024-01-03,5,6,4,5,20\n"),
        macro_data: csv("quarter,GDP,inflation\n2023-Q4,100,3\n2024-Q1,110,4\n"),
        companies: csv("rank,company,industry,ticker\n1,Apple,Technology,AAPL\n2,Microsoft,Technology,MSFT\n"),
        exchange: csv("date,usd_inr_rate\n2024-01-02,83.1\n2024-01-03,83.3\n"),
    }
}

#[test]
fn daily_return_starts_at_zero_and_tracks_previous_close() {
    let facts = KpiEngine::default()
        .compute(&inputs(), 2024)
        .expect("compute facts");

    let aapl: Vec<&StockFact> = facts
        .stock_facts
        .iter()
        .filter(|f| f.ticker == "AAPL")
        .collect();
    assert_eq!(aapl[0].date, date(2024, 1, 2));
    assert_eq!(aapl[0].daily_return, 0.0);
    assert!((aapl[1].daily_return - 10.0).abs() < 1e-9);
    assert_eq!(aapl[0].volatility_30d, 0.0);
    assert!((aapl[1].moving_avg_30d - 105.0).abs() < 1e-9);
    assert_eq!(aapl[1].price_range, 12.0);
    assert_eq!(aapl[1].quarter, 1);

    let msft: Vec<&StockFact> = facts
        .stock_facts
        .iter()
        .filter(|f| f.ticker == "MSFT")
        .collect();
    assert_eq!(msft[1].daily_return, 0.0, "previous close of zero");
}

#[test]
fn tied_returns_share_a_dense_sector_rank() {
    let day = date(2024, 1, 2);
    let facts = vec![fact("AAA", day, 5.0), fact("BBB", day, 5.0), fact("CCC", day, 3.0)];
    let companies = csv(
        "ticker,industry\nAAA,Energy\nBBB,Energy\nCCC,Energy\n",
    );
    let sectors = sector_lookup(&companies).expect("sectors");

    let rows = analytics_summary(&facts, &companies, &sectors, &[], &HashMap::new())
        .expect("analytics");
    let ranks: Vec<u32> = rows.iter().map(|row| row.sector_rank).collect();
    assert_eq!(ranks, vec![1, 1, 2]);

    let sector_avg = 13.0 / 3.0;
    assert!((rows[0].sector_avg_return - sector_avg).abs() < 1e-9);
    let outperforming: Vec<u8> = rows.iter().map(|row| row.outperforming_sector).collect();
    assert_eq!(outperforming, vec![1, 1, 0]);
}

#[test]
fn tickers_without_sector_are_not_ranked() {
    let day = date(2024, 1, 2);
    let facts = vec![fact("AAA", day, 5.0), fact("ZZZ", day, 9.0)];
    let companies = csv("ticker,industry\nAAA,Energy\n");
    let sectors = sector_lookup(&companies).expect("sectors");

    let rows = analytics_summary(&facts, &companies, &sectors, &[], &HashMap::new())
        .expect("analytics");
    let orphan = rows.iter().find(|row| row.ticker == "ZZZ").expect("row");
    assert_eq!(orphan.sector_name, None);
    assert_eq!(orphan.sector_rank, 0);
    assert_eq!(orphan.outperforming_sector, 0);
}

#[test]
fn resilience_is_zero_without_recession_years() {
    let facts = vec![
        fact("AAA", date(2024, 1, 2), 1.0),
        fact("AAA", date(2024, 1, 3), -2.0),
    ];
    let companies = csv("ticker,industry\nAAA,Energy\n");
    let sectors = sector_lookup(&companies).expect("sectors");
    let yearly = vec![YearlyMacro {
        year: 2024,
        avg_gdp: Some(100.0),
        avg_inflation: Some(2.0),
        gdp_growth: 1.5,
        inflation_trend: 0.0,
        is_recession: false,
    }];

    let rows = analytics_summary(&facts, &companies, &sectors, &yearly, &HashMap::new())
        .expect("analytics");
    assert!(rows.iter().all(|row| row.recession_resilience_score == 0.0));
}

#[test]
fn resilience_averages_returns_in_recession_years() {
    let facts = vec![
        fact("AAA", date(2024, 1, 2), 1.0),
        fact("AAA", date(2024, 1, 3), -2.0),
    ];
    let companies = csv("ticker,industry\nAAA,Energy\n");
    let sectors = sector_lookup(&companies).expect("sectors");
    let yearly = vec![YearlyMacro {
        year: 2024,
        avg_gdp: Some(90.0),
        avg_inflation: Some(2.0),
        gdp_growth: -10.0,
        inflation_trend: 0.0,
        is_recession: true,
    }];

    let rows = analytics_summary(&facts, &companies, &sectors, &yearly, &HashMap::new())
        .expect("analytics");
    assert_eq!(rows.len(), 1);
    assert!((rows[0].recession_resilience_score + 0.5).abs() < 1e-9);
    assert_eq!(rows[0].total_volume, 200);
}

#[test]
fn macro_growth_compares_consecutive_years() {
    let data = csv(
        "quarter,GDP,inflation\n\
         2023-Q1,100,3\n\
         2023-Q2,100,5\n\
         2024-Q1,90,6\n\
         Q2,,\n",
    );

    let (facts, yearly) = macro_facts(&data, 2024).expect("macro facts");
    assert_eq!(yearly.len(), 2);
    assert_eq!(yearly[0].gdp_growth, 0.0);
    assert_eq!(yearly[0].inflation_trend, 0.0);
    assert!((yearly[1].gdp_growth + 10.0).abs() < 1e-9);
    assert!((yearly[1].inflation_trend - 2.0).abs() < 1e-9);
    assert!(yearly[1].is_recession);

    let bare = facts.last().expect("bare quarter row");
    assert_eq!((bare.year, bare.quarter_num), (2024, 2));
    assert_eq!(bare.gdp, 0.0);
    assert_eq!(bare.is_recession, 1);
}

#[test]
fn sector_codes_keep_prefix_collisions() {
    let companies = csv(
        "ticker,industry\nA,Technology\nB,\nC,Technical Services\nD,Technology\n",
    );
    let sectors = sector_lookup(&companies).expect("sectors");
    assert_eq!(sectors.len(), 2);
    assert_eq!(sectors[0].sector_id, 1);
    assert_eq!(sectors[1].sector_id, 2);
    assert_eq!(sectors[0].sector_code, "TECH");
    assert_eq!(sectors[1].sector_code, "TECH");
}

#[test]
fn missing_partition_fails_the_kpi_stage() {
    let dir = temp_dir("finlake_kpi_missing");
    let ctx = ExecutionContext::in_dir(&dir, RunMode::Live { date: date(2024, 1, 3) })
        .expect("context");
    fs::write(ctx.valid_path("stocks_raw"), "ticker,company,date,open,high,low,close,volume\n")
        .expect("write stocks");

    let err = KpiEngine::default()
        .compute_facts(&ctx)
        .expect_err("stocks is empty");
    assert!(matches!(err, KpiError::EmptyInput(table) if table == "stocks_raw"));

    fs::write(
        ctx.valid_path("stocks_raw"),
        "ticker,company,date,open,high,low,close,volume\nAAPL,Apple,2024-01-02,1,1,1,1,1\n",
    )
    .expect("write stocks");
    let err = KpiEngine::default()
        .compute_facts(&ctx)
        .expect_err("macro is missing");
    assert!(matches!(err, KpiError::MissingInput(path) if path.ends_with("valid_macro_raw.csv")));
}

#[test]
fn compute_facts_writes_the_four_tables() {
    let dir = temp_dir("finlake_kpi_write");
    let ctx = ExecutionContext::in_dir(&dir, RunMode::Live { date: date(2024, 1, 3) })
        .expect("context");
    fs::write(
        ctx.valid_path("stocks_raw"),
        "ticker,company,date,open,high,low,close,volume\n\
         AAPL,Apple,2024-01-02,99,101,98,100,900\n\
         AAPL,Apple,2024-01-03,101,112,100,110,1000\n",
    )
    .expect("write stocks");
    fs::write(ctx.valid_path("macro_raw"), "quarter,GDP,inflation\n2024-Q1,110,4\n")
        .expect("write macro");
    fs::write(
        ctx.valid_path("company_metadata"),
        "rank,company,industry,ticker\n1,Apple,Technology,AAPL\n",
    )
    .expect("write companies");
    fs::write(ctx.valid_path("exchange_rates"), "date,usd_inr_rate\n2024-01-02,83.1\n")
        .expect("write exchange");

    let facts = KpiEngine::default().compute_facts(&ctx).expect("compute facts");
    assert_eq!(facts.stock_facts.len(), 2);
    assert_eq!(facts.analytics_summary.len(), 1);

    for name in ["stock_facts", "macro_facts", "sector_lookup", "analytics_summary"] {
        let path = dir.join(format!("{name}.csv"));
        assert!(path.exists(), "missing {}", path.display());
    }
    let macro_csv = fs::read_to_string(dir.join("macro_facts.csv")).expect("read macro facts");
    assert!(macro_csv.starts_with("quarter,year,quarter_num,GDP,"));
}
