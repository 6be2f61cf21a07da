use std::sync::OnceLock;

use finlake_core::{ColumnType, Value, parse_date};
use regex::Regex;

fn integer_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?\d+$").ok()).as_ref()
}

/// 2^63; every whole float in `-I64_BOUND..I64_BOUND` fits in an `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn whole_float_to_int(float: f64) -> Result<Value, String> {
    if !float.is_finite() || float.fract() != 0.0 {
        return Err(format!("not an integer ({float})"));
    }
    if !(-I64_BOUND..I64_BOUND).contains(&float) {
        return Err(format!("integer out of range ({float})"));
    }
    Ok(Value::Int(float as i64))
}

/// Convert a non-null value to the declared column type.
///
/// Integers accept whole floats within `i64` range and strings that fully
/// match an integer literal or a whole float literal; anything else is
/// rejected.
pub fn coerce(value: &Value, column_type: ColumnType) -> Result<Value, String> {
    match column_type {
        ColumnType::String => Ok(Value::Text(value.to_string())),
        ColumnType::Float => match value {
            Value::Date(_) => Err(format!("cannot convert date {value} to float")),
            other => other
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| format!("not a float ({other})")),
        },
        ColumnType::Integer => match value {
            Value::Int(int) => Ok(Value::Int(*int)),
            Value::Float(float) => whole_float_to_int(*float),
            Value::Text(text) => {
                let trimmed = text.trim();
                if integer_pattern().is_some_and(|re| re.is_match(trimmed)) {
                    return trimmed
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| format!("integer out of range ({text})"));
                }
                match trimmed.parse::<f64>() {
                    Ok(float) if float.is_finite() && float.fract() == 0.0 => {
                        whole_float_to_int(float)
                    }
                    _ => Err(format!("string not integer ({text})")),
                }
            }
            other => Err(format!("invalid value {other} for integer")),
        },
        ColumnType::Date => match value {
            Value::Date(date) => Ok(Value::Date(*date)),
            Value::Float(_) => Err(format!("cannot convert {value} to date")),
            other => parse_date(&other.to_string())
                .map(Value::Date)
                .ok_or_else(|| format!("invalid date ({other})")),
        },
    }
}
