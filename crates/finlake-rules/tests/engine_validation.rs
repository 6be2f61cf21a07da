use finlake_core::{Dataset, RuleCatalog, Value, read_csv_from};
use finlake_rules::{References, RuleEngine, RuleError};

fn engine(rules: &str) -> RuleEngine {
    RuleEngine::new(RuleCatalog::from_json_str(rules).expect("parse rules"))
}

fn csv(data: &str) -> Dataset {
    read_csv_from(data.as_bytes()).expect("parse csv")
}

const STOCK_RULES: &str = r#"{
    "tables": {
        "stocks_raw": {
            "ticker": {"type": "string", "rules": ["uppercase_trim", "not_null"]},
            "company": {"type": "string", "rules": ["not_null"]},
            "date": {"type": "date", "rules": ["not_null", "iso_date"]},
            "close": {"type": "float", "rules": ["not_null", "positive"]},
            "volume": {"type": "integer", "rules": ["not_null", "non_negative"]}
        },
        "sentiment": {
            "ticker": {"type": "string", "rules": ["uppercase_trim", "referential:stocks_raw.ticker"]},
            "company": {"type": "string", "rules": ["match_company_for_ticker:stocks_raw"]},
            "sentiment_score": {"type": "float", "rules": ["in_range:-1:1"]}
        }
    }
}"#;

#[test]
fn integer_columns_accept_whole_numbers_only() {
    let engine = engine(r#"{"tables": {"t": {"qty": {"type": "integer", "rules": ["not_null"]}}}}"#);
    let data = csv("qty\n12\n12.5\n12.0\n");

    let result = engine.validate(&data, "t", None).expect("validate");
    let valid: Vec<usize> = result.valid.iter().map(|row| row.index).collect();
    assert_eq!(valid, vec![0, 2]);
    assert_eq!(result.invalid[0].index, 1);

    let coerced = result.valid_dataset();
    assert_eq!(coerced.rows()[0].values()[0], Value::Int(12));
    assert_eq!(coerced.rows()[1].values()[0], Value::Int(12));
}

#[test]
fn oversized_integers_are_rejected_not_clamped() {
    let engine = engine(
        r#"{"tables": {"t": {"volume": {"type": "integer", "rules": ["not_null", "non_negative"]}}}}"#,
    );
    let data = csv("volume\n1e20\n99999999999999999999\n9223372036854775807\n");

    let result = engine.validate(&data, "t", None).expect("validate");
    let valid: Vec<usize> = result.valid.iter().map(|row| row.index).collect();
    assert_eq!(valid, vec![2]);
    assert_eq!(result.valid_dataset().rows()[0].values()[0], Value::Int(i64::MAX));

    let invalid: Vec<usize> = result.invalid.iter().map(|row| row.index).collect();
    assert_eq!(invalid, vec![0, 1]);
    assert!(result.failures.iter().all(|failure| failure.column == "volume"));
}

#[test]
fn string_columns_keep_values_as_written() {
    let engine = engine(
        r#"{"tables": {"t": {"company": {"type": "string", "rules": ["not_null"]}}}}"#,
    );
    let data = csv("company\n007\n1.50\nNaN\nInfinity\n");

    let result = engine.validate(&data, "t", None).expect("validate");
    let kept: Vec<String> = result
        .valid_dataset()
        .rows()
        .iter()
        .map(|row| row.values()[0].to_string())
        .collect();
    assert_eq!(kept, vec!["007", "1.50", "Infinity"]);
    let invalid: Vec<usize> = result.invalid.iter().map(|row| row.index).collect();
    assert_eq!(invalid, vec![2]);
}

#[test]
fn later_duplicates_fail_uniqueness() {
    let engine = engine(
        r#"{"tables": {"t": {"id": {"type": "string", "rules": ["unique"]}}}}"#,
    );
    let data = csv("id\nA\nB\nA\n");

    let result = engine.validate(&data, "t", None).expect("validate");
    let valid: Vec<usize> = result.valid.iter().map(|row| row.index).collect();
    assert_eq!(valid, vec![0, 1]);
    let codes: Vec<&str> = result.failures.iter().map(|f| f.code.as_str()).collect();
    assert_eq!(codes, vec!["unique"]);
    assert_eq!(result.failures[0].row_index, 2);
}

#[test]
fn trimmed_uniqueness_ignores_surrounding_whitespace() {
    let engine = engine(
        r#"{"tables": {"t": {"company": {"type": "string", "rules": ["unique_trimmed"]}}}}"#,
    );
    let data = csv("company\nAcme\n\" Acme \"\nGlobex\n");

    let result = engine.validate(&data, "t", None).expect("validate");
    assert_eq!(result.valid_count(), 2);
    assert_eq!(result.invalid[0].index, 1);
}

#[test]
fn uniqueness_trackers_include_rows_invalid_elsewhere() {
    let engine = engine(
        r#"{"tables": {"t": {
            "id": {"type": "string", "rules": ["unique"]},
            "amount": {"type": "float", "rules": ["positive"]}
        }}}"#,
    );
    let data = csv("id,amount\nA,-1\nA,5\n");

    let result = engine.validate(&data, "t", None).expect("validate");
    assert_eq!(result.valid_count(), 0);
    assert_eq!(result.failures.len(), 2);
    assert_eq!(result.failures[0].column, "amount");
    assert_eq!(result.failures[1].column, "id");
}

#[test]
fn failing_rule_short_circuits_only_its_column() {
    let engine = engine(STOCK_RULES);
    let data = csv(
        "ticker,company,date,close,volume\n\
         AAPL,Apple,2024-01-02,abc,-5\n",
    );

    let result = engine.validate(&data, "stocks_raw", None).expect("validate");
    assert_eq!(result.invalid_count(), 1);
    let mut columns: Vec<&str> = result.failures.iter().map(|f| f.column.as_str()).collect();
    columns.sort();
    assert_eq!(columns, vec!["close", "volume"]);
    let close = result
        .failures
        .iter()
        .find(|f| f.column == "close")
        .expect("close failure");
    assert_eq!(close.code, "type");
}

#[test]
fn every_invalid_row_has_a_recorded_failure() {
    let engine = engine(STOCK_RULES);
    let data = csv(
        "ticker,company,date,close,volume\n\
         aapl ,Apple,2024-01-02,10,100\n\
         MSFT,Microsoft,not-a-date,10,100\n\
         GOOG,,2024-01-02,10,100\n\
         AMZN,Amazon,2024-01-02,0,100\n\
         TSLA,Tesla,2024-01-02,5,7.5\n",
    );

    let result = engine.validate(&data, "stocks_raw", None).expect("validate");
    assert_eq!(result.valid_count(), 1);
    assert_eq!(result.invalid_count(), 4);
    for row in &result.invalid {
        assert!(
            result.failures_for(row.index).next().is_some(),
            "row {} has no failure",
            row.index
        );
    }
    for row in &result.valid {
        assert!(result.failures_for(row.index).next().is_none());
    }

    let valid = result.valid_dataset();
    let first = valid.record(0).expect("valid row");
    assert_eq!(first.value("ticker"), &Value::text("AAPL"));
    assert!(matches!(first.value("date"), Value::Date(_)));

    let invalid = result.invalid_dataset();
    assert_eq!(invalid.columns(), valid.columns());
    assert_eq!(
        invalid.record(0).expect("invalid row").value("date"),
        &Value::text("not-a-date")
    );
}

#[test]
fn revalidating_the_valid_partition_keeps_every_row() {
    let engine = engine(STOCK_RULES);
    let data = csv(
        "ticker,company,date,close,volume\n\
         AAPL,Apple,2024-01-02,10,100\n\
         AAPL,Apple,2024-01-03,11,120\n\
         MSFT,Microsoft,2024-01-02,-3,100\n",
    );

    let first = engine.validate(&data, "stocks_raw", None).expect("validate");
    let valid = first.valid_dataset();
    let second = engine.validate(&valid, "stocks_raw", None).expect("revalidate");
    assert_eq!(second.valid_count(), valid.len());
    assert_eq!(second.invalid_count(), 0);
}

#[test]
fn referential_checks_need_a_reference_table() {
    let engine = engine(STOCK_RULES);
    let stocks = engine
        .validate(
            &csv("ticker,company,date,close,volume\nAAPL,Apple Inc.,2024-01-02,10,100\n"),
            "stocks_raw",
            None,
        )
        .expect("validate stocks");
    let sentiment = csv(
        "ticker,company,sentiment_score\n\
         aapl,Apple Inc.,0.5\n\
         TSLA,Tesla,0.1\n",
    );

    let unchecked = engine
        .validate(&sentiment, "sentiment", None)
        .expect("validate without refs");
    assert_eq!(unchecked.valid_count(), 2);

    let mut refs = References::new();
    refs.insert("stocks_raw", stocks.valid_dataset());
    let checked = engine
        .validate(&sentiment, "sentiment", Some(&refs))
        .expect("validate with refs");
    assert_eq!(checked.valid_count(), 1);
    assert_eq!(checked.invalid[0].index, 1);
    assert_eq!(checked.failures[0].code, "referential");
}

#[test]
fn company_must_match_reference_ticker() {
    let engine = engine(STOCK_RULES);
    let stocks = csv("ticker,company,date,close,volume\nAAPL,Apple Inc.,2024-01-02,10,100\n");
    let mut refs = References::new();
    refs.insert("stocks_raw", stocks);

    let sentiment = csv(
        "ticker,company,sentiment_score\n\
         AAPL, apple inc. ,0.5\n\
         AAPL,Microsoft,0.2\n",
    );
    let result = engine
        .validate(&sentiment, "sentiment", Some(&refs))
        .expect("validate");
    assert_eq!(result.valid_count(), 1);
    assert_eq!(result.failures[0].code, "match_company_for_ticker");
    assert_eq!(result.failures[0].row_index, 1);
}

#[test]
fn missing_reference_ticker_does_not_fail_company_match() {
    let engine = engine(
        r#"{"tables": {
            "stocks_raw": {"ticker": {"type": "string"}, "company": {"type": "string"}},
            "news": {"company": {"type": "string", "rules": ["match_company_for_ticker:stocks_raw"]}}
        }}"#,
    );
    let mut refs = References::new();
    refs.insert("stocks_raw", csv("ticker,company\nAAPL,Apple Inc.\n"));

    let news = csv("ticker,company\nNFLX,Netflix\n");
    let result = engine.validate(&news, "news", Some(&refs)).expect("validate");
    assert_eq!(result.valid_count(), 1);
}

#[test]
fn unknown_table_is_a_configuration_error() {
    let engine = engine(STOCK_RULES);
    let err = engine
        .validate(&csv("a\n1\n"), "bonds_raw", None)
        .expect_err("no rules for bonds_raw");
    assert!(matches!(err, RuleError::UnknownTable(table) if table == "bonds_raw"));
}

#[test]
fn absent_schema_columns_are_added_as_nulls() {
    let engine = engine(STOCK_RULES);
    let data = csv("ticker,company,date,close\nAAPL,Apple,2024-01-02,10\n");

    let result = engine.validate(&data, "stocks_raw", None).expect("validate");
    assert_eq!(result.columns.last().map(String::as_str), Some("volume"));
    assert_eq!(result.invalid_count(), 1);
    assert_eq!(result.failures[0].code, "not_null");
}
