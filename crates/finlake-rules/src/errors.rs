use finlake_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("no rules found for table: {0}")]
    UnknownTable(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}
