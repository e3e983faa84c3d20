//! Integration tests for tidb-query.
//!
//! `executor_test` runs against the mock pool; the others need DATABASE_URL.

pub mod connection_test;
pub mod executor_test;
pub mod query_test;
