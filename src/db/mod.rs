//! Database abstraction layer for tidb-query.
//!
//! Provides the pool and connection traits the executor drives, so that the
//! sqlx-backed MySQL pool and the scripted mock pool can be used interchangeably.

mod mock;
mod mysql;
mod types;

pub use mock::{MockConnection, MockPool, MockResponse, RecordedRequest};
pub use mysql::{column_type_code, MySqlConnectionPool, MySqlPooledConnection};
pub use types::{FieldMeta, QueryResult, Row, Rows, Value, WriteAck};

use async_trait::async_trait;
use std::time::Duration;

/// Result type for raw driver calls. The error is never reinterpreted.
pub type DriverResult<T> = std::result::Result<T, sqlx::Error>;

/// A loosely typed column descriptor as reported by the driver.
///
/// Only `name` and `columnType` are read back out; drivers may attach more keys.
pub type RawField = serde_json::Map<String, serde_json::Value>;

/// What the driver returned for one query call, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    /// Row payload, passed through to the caller untouched.
    pub rows: Rows,

    /// Column descriptors, absent for results without a column set.
    pub fields: Option<Vec<RawField>>,
}

impl RawResult {
    /// A result with rows and column descriptors.
    pub fn with_fields(rows: Rows, fields: Vec<RawField>) -> Self {
        Self {
            rows,
            fields: Some(fields),
        }
    }

    /// A write acknowledgment, which carries no column descriptors.
    pub fn ack(affected_rows: u64, insert_id: u64) -> Self {
        Self {
            rows: Rows::Ack(WriteAck {
                affected_rows,
                insert_id,
            }),
            fields: None,
        }
    }
}

/// Builds a raw descriptor the way the drivers in this crate report them.
pub fn raw_field(name: &str, column_type: u8) -> RawField {
    let mut field = RawField::new();
    field.insert("name".into(), name.into());
    field.insert("columnType".into(), column_type.into());
    field
}

/// One statement sent over a connection.
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    /// SQL text, sent verbatim.
    pub sql: &'a str,

    /// Positional parameters bound by the driver. `None` sends plain text.
    pub params: Option<&'a [Value]>,

    /// Driver-side execution timeout.
    pub timeout: Option<Duration>,
}

impl<'a> QueryRequest<'a> {
    /// A plain text statement without timeout.
    pub fn text(sql: &'a str) -> Self {
        Self {
            sql,
            params: None,
            timeout: None,
        }
    }

    /// A parameterized statement without timeout.
    pub fn prepared(sql: &'a str, params: &'a [Value]) -> Self {
        Self {
            sql,
            params: Some(params),
            timeout: None,
        }
    }

    /// Sets the driver-side timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A pool of reusable connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Connection type handed out by this pool.
    type Connection: PoolConnection;

    /// Waits for a connection, subject to the pool's own backpressure policy.
    async fn acquire(&self) -> DriverResult<Self::Connection>;

    /// Closes the pool, waiting for checked-out connections to come back.
    async fn close(&self);
}

/// A connection checked out of a [`ConnectionPool`].
#[async_trait]
pub trait PoolConnection: Send {
    /// Identifier used in log output.
    fn id(&self) -> u64;

    /// Runs one request and settles exactly once.
    async fn query(&mut self, request: QueryRequest<'_>) -> DriverResult<RawResult>;

    /// Hands the connection back to its pool.
    fn release(self)
    where
        Self: Sized;
}
