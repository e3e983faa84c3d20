//! tidb-query - a connection-pooled SQL executor for TiDB.
//!
//! This library exposes the core modules for use by the binary and
//! integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod query;

pub use error::{ExecutorError, Result};
pub use query::{QueryExecutor, QueryOptions};
