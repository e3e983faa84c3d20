//! Query execution for tidb-query.
//!
//! This module holds the executor, its connection guard, and the
//! field-metadata normalization step.

pub mod executor;
mod fields;
mod guard;

pub use executor::{memory_quota_statement, QueryExecutor, QueryOptions, LOG_TARGET};
pub use fields::normalize_fields;
