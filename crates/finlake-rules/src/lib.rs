//! Config-driven data-quality rule engine.
//!
//! [`RuleEngine::validate`] type-checks every configured column of a dataset,
//! evaluates its ordered constraints and splits the rows into valid and
//! invalid partitions. Referential checks consult [`References`] built from
//! tables validated earlier in the same run.

pub mod coerce;
pub mod engine;
pub mod errors;
pub mod model;
pub mod references;

pub use engine::RuleEngine;
pub use errors::RuleError;
pub use model::{RowFailure, ValidatedRow, ValidationResult};
pub use references::{ReferenceSet, References, normalize_key};
