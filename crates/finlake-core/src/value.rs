use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// A single cell of a dataset.
///
/// Raw cells read from CSV are inferred as `Int`, `Float` or `Text`; `Date`
/// only appears after a column has been coerced by the rule engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// Infer a typed value from a raw CSV field.
    ///
    /// Numbers are only inferred when they render back to the same text, so
    /// fields such as `007`, `1.50` or `Infinity` stay `Text` as written.
    /// NaN spellings are read as missing.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if is_nan_literal(trimmed) {
            return Value::Float(f64::NAN);
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            if value.to_string() == trimmed {
                return Value::Int(value);
            }
            return Value::Text(raw.to_string());
        }
        if looks_numeric(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                if value.is_finite() && value.to_string() == trimmed {
                    return Value::Float(value);
                }
            }
        }
        Value::Text(raw.to_string())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    /// Null cells and NaN floats are both treated as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(value) => value.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) if !value.is_nan() => Some(*value),
            Value::Text(value) => value.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i64)
            }
            Value::Text(value) => value.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(value) => Some(*value),
            Value::Text(value) => parse_date(value),
            _ => None,
        }
    }

    /// Serialized CSV representation; missing values become empty fields.
    pub fn to_csv_field(&self) -> String {
        if self.is_null() {
            return String::new();
        }
        self.to_string()
    }

    /// Key used for set membership (uniqueness and entity keys).
    pub fn key(&self) -> String {
        if self.is_null() {
            return "<null>".to_string();
        }
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse the date formats accepted for `date` columns.
///
/// Timestamps are accepted and truncated to their calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|ts| ts.date_naive())
}

fn is_nan_literal(value: &str) -> bool {
    value
        .trim_start_matches(['+', '-'])
        .eq_ignore_ascii_case("nan")
}

fn looks_numeric(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_numbers_and_text() {
        assert_eq!(Value::infer("12"), Value::Int(12));
        assert_eq!(Value::infer("12.5"), Value::Float(12.5));
        assert_eq!(Value::infer(" "), Value::Null);
        assert_eq!(Value::infer("AAPL"), Value::Text("AAPL".to_string()));
        assert_eq!(
            Value::infer("2024-01-02"),
            Value::Text("2024-01-02".to_string())
        );
    }

    #[test]
    fn non_canonical_numbers_keep_their_text() {
        assert_eq!(Value::infer("007"), Value::text("007"));
        assert_eq!(Value::infer("1.50"), Value::text("1.50"));
        assert_eq!(Value::infer("Infinity"), Value::text("Infinity"));
        assert_eq!(Value::infer("1e20"), Value::text("1e20"));
        assert_eq!(
            Value::infer("99999999999999999999"),
            Value::text("99999999999999999999")
        );
        assert_eq!(Value::infer("-0.25"), Value::Float(-0.25));
        assert_eq!(Value::infer("1.50").as_f64(), Some(1.5));
    }

    #[test]
    fn nan_counts_as_null() {
        assert!(Value::Float(f64::NAN).is_null());
        assert!(Value::infer("NaN").is_null());
        assert_eq!(Value::Float(f64::NAN).to_csv_field(), "");
    }

    #[test]
    fn parses_supported_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 5);
        assert_eq!(parse_date("2024-11-05"), expected);
        assert_eq!(parse_date("2024/11/05"), expected);
        assert_eq!(parse_date("2024-11-05 09:30:00"), expected);
        assert_eq!(parse_date("2024-11-05T09:30:00+05:30"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }
}
