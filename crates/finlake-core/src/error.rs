use thiserror::Error;

/// Core error type shared across finlake crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A rule directive or column declaration cannot be compiled.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    /// No rule schema is registered for the table.
    #[error("no rules found for table: {0}")]
    UnknownTable(String),
    /// A column required by an operation is absent from the dataset.
    #[error("missing column: {0}")]
    MissingColumn(String),
    /// A requested date range is empty or malformed.
    #[error("invalid date range: {0}")]
    InvalidRange(String),
}

/// Convenience alias for results returned by finlake crates.
pub type Result<T> = std::result::Result<T, CoreError>;
