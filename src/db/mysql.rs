//! MySQL-protocol pool implementation.
//!
//! Provides `MySqlConnectionPool`, the sqlx-backed [`ConnectionPool`] used
//! against TiDB and MySQL servers.

use crate::config::PoolConfig;
use crate::db::{
    ConnectionPool, DriverResult, PoolConnection, QueryRequest, RawField, RawResult, Row, Rows,
    Value, WriteAck,
};
use crate::error::Result;
use crate::query::LOG_TARGET;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlColumn, MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlRow,
};
use sqlx::pool::PoolConnection as SqlxPoolConnection;
use sqlx::query::Query;
use sqlx::types::chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{Column, Decode, Either, Executor, Row as SqlxRow, Statement, Type, TypeInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// sqlx MySQL pool.
#[derive(Debug)]
pub struct MySqlConnectionPool {
    pool: MySqlPool,
    leases: AtomicU64,
}

impl MySqlConnectionPool {
    /// Creates the pool without opening any connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(config.idle_timeout_secs.map(Duration::from_secs))
            .connect_lazy_with(config.connect_options());

        debug!(target: LOG_TARGET, "Created pool for {}", config.display_string());
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing sqlx pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool,
            leases: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ConnectionPool for MySqlConnectionPool {
    type Connection = MySqlPooledConnection;

    async fn acquire(&self) -> DriverResult<MySqlPooledConnection> {
        let conn = self.pool.acquire().await?;
        // sqlx does not expose the server thread id, so connections are
        // identified by lease sequence number.
        let id = self.leases.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MySqlPooledConnection {
            conn,
            id,
            timed_out: false,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// A connection leased from [`MySqlConnectionPool`].
#[derive(Debug)]
pub struct MySqlPooledConnection {
    conn: SqlxPoolConnection<MySql>,
    id: u64,
    timed_out: bool,
}

#[async_trait]
impl PoolConnection for MySqlPooledConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn query(&mut self, request: QueryRequest<'_>) -> DriverResult<RawResult> {
        let run = run_request(&mut self.conn, request.sql, request.params);

        match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    self.timed_out = true;
                    Err(timeout_error(limit))
                }
            },
            None => run.await,
        }
    }

    fn release(mut self) {
        // A timed out call may have left unread packets on the wire.
        if self.timed_out {
            self.conn.close_on_drop();
        }
        drop(self.conn);
    }
}

/// Output of one statement in a (possibly multi-statement) query.
#[derive(Debug, Default)]
struct StatementOutput {
    rows: Vec<Row>,
    ack: WriteAck,
}

impl StatementOutput {
    fn into_rows(self) -> Rows {
        if self.rows.is_empty() {
            Rows::Ack(self.ack)
        } else {
            Rows::Records(self.rows)
        }
    }
}

async fn run_request(
    conn: &mut MySqlConnection,
    sql: &str,
    params: Option<&[Value]>,
) -> DriverResult<RawResult> {
    // Plain SQL goes over the text protocol; parameters force a server-side
    // prepared statement so binding happens in the driver.
    let mut stream = match params {
        None => (&mut *conn).fetch_many(sql),
        Some(params) => {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, value| bind_value(query, value));
            (&mut *conn).fetch_many(query)
        }
    };

    let mut statements = Vec::new();
    let mut current = Vec::new();
    let mut fields: Option<Vec<RawField>> = None;

    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Right(row) => {
                if fields.is_none() {
                    fields = Some(describe_columns(row.columns()));
                }
                current.push(convert_row(&row));
            }
            Either::Left(done) => statements.push(StatementOutput {
                rows: std::mem::take(&mut current),
                ack: WriteAck {
                    affected_rows: done.rows_affected(),
                    insert_id: done.last_insert_id(),
                },
            }),
        }
    }

    if !current.is_empty() {
        statements.push(StatementOutput {
            rows: current,
            ack: WriteAck::default(),
        });
    }
    drop(stream);

    // An empty result set and a write look the same on the stream; only the
    // statement's column list tells them apart.
    if let [only] = statements.as_slice() {
        if only.rows.is_empty() {
            fields = describe_statement(conn, sql).await;
        }
    }

    Ok(shape_statements(statements, fields))
}

/// Column descriptors of a statement, taken from its prepared form.
///
/// `None` when the server refuses to prepare it.
async fn describe_statement(conn: &mut MySqlConnection, sql: &str) -> Option<Vec<RawField>> {
    match conn.prepare(sql).await {
        Ok(statement) => Some(describe_columns(statement.columns())),
        Err(e) => {
            debug!(target: LOG_TARGET, error = %e, "Could not describe statement");
            None
        }
    }
}

/// Picks the payload shape for the collected statement outputs.
///
/// A single statement without rows is an empty result set when it has
/// columns, and an acknowledgment otherwise. Inside a multi-statement
/// result every statement without rows is an acknowledgment.
fn shape_statements(
    mut statements: Vec<StatementOutput>,
    fields: Option<Vec<RawField>>,
) -> RawResult {
    if statements.len() > 1 {
        return RawResult {
            rows: Rows::Sets(
                statements
                    .into_iter()
                    .map(StatementOutput::into_rows)
                    .collect(),
            ),
            fields,
        };
    }

    match statements.pop() {
        Some(statement) if !statement.rows.is_empty() => RawResult {
            rows: Rows::Records(statement.rows),
            fields,
        },
        Some(statement) => match fields {
            Some(fields) if !fields.is_empty() => RawResult {
                rows: Rows::Records(Vec::new()),
                fields: Some(fields),
            },
            _ => RawResult {
                rows: Rows::Ack(statement.ack),
                fields: None,
            },
        },
        None => RawResult::ack(0, 0),
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::UInt(u) => query.bind(*u),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

fn timeout_error(limit: Duration) -> sqlx::Error {
    sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("Query timed out after {} ms", limit.as_millis()),
    ))
}

/// Reports column descriptors, keyed the way the executor reads them.
fn describe_columns(columns: &[MySqlColumn]) -> Vec<RawField> {
    columns
        .iter()
        .map(|col| {
            let type_name = col.type_info().name();
            let mut field = RawField::new();
            field.insert("name".into(), col.name().into());
            if let Some(code) = column_type_code(type_name) {
                field.insert("columnType".into(), code.into());
            }
            field.insert("typeName".into(), type_name.into());
            field
        })
        .collect()
}

/// Maps a sqlx MySQL type name to the protocol column type code.
pub fn column_type_code(type_name: &str) -> Option<u8> {
    let upper = type_name.to_uppercase();
    let base = upper.strip_suffix(" UNSIGNED").unwrap_or(&upper);

    let code = match base {
        "BOOLEAN" | "TINYINT" => 1,
        "SMALLINT" => 2,
        "INT" => 3,
        "FLOAT" => 4,
        "DOUBLE" => 5,
        "NULL" => 6,
        "TIMESTAMP" => 7,
        "BIGINT" => 8,
        "MEDIUMINT" => 9,
        "DATE" => 10,
        "TIME" => 11,
        "DATETIME" => 12,
        "YEAR" => 13,
        "BIT" => 16,
        "JSON" => 245,
        "DECIMAL" => 246,
        "ENUM" => 247,
        "SET" => 248,
        "TINYBLOB" | "TINYTEXT" => 249,
        "MEDIUMBLOB" | "MEDIUMTEXT" => 250,
        "LONGBLOB" | "LONGTEXT" => 251,
        "BLOB" | "TEXT" => 252,
        "VARBINARY" | "VARCHAR" => 253,
        "BINARY" | "CHAR" => 254,
        "GEOMETRY" => 255,
        _ => return None,
    };

    Some(code)
}

/// Converts a sqlx MySqlRow to our Row type.
fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            (
                col.name().to_string(),
                convert_value(row, i, col.type_info().name()),
            )
        })
        .collect()
}

/// Converts a single column value from a MySqlRow to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let upper = type_name.to_uppercase();

    let typed = if upper.ends_with(" UNSIGNED") {
        decode::<u64>(row, index, Value::UInt)
    } else {
        match upper.as_str() {
            "BOOLEAN" => decode::<bool>(row, index, Value::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                decode::<i64>(row, index, Value::Int)
            }
            "FLOAT" => decode::<f32>(row, index, |v| Value::Float(f64::from(v))),
            "DOUBLE" => decode::<f64>(row, index, Value::Float),
            "DATE" => decode::<NaiveDate>(row, index, |v| Value::String(v.to_string())),
            "DATETIME" | "TIMESTAMP" => {
                decode::<NaiveDateTime>(row, index, |v| Value::String(v.to_string()))
            }
            "TIME" => decode::<NaiveTime>(row, index, |v| Value::String(v.to_string())),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => decode::<Vec<u8>>(row, index, Value::Bytes),
            _ => None,
        }
    };

    typed.unwrap_or_else(|| decode_untyped(row, index))
}

/// Decodes with type checking. `None` means the column did not decode as `T`.
fn decode<'r, T>(row: &'r MySqlRow, index: usize, wrap: impl FnOnce(T) -> Value) -> Option<Value>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index)
        .ok()
        .map(|value| value.map(wrap).unwrap_or(Value::Null))
}

/// Falls back to the raw text, then raw bytes, of a column.
fn decode_untyped(row: &MySqlRow, index: usize) -> Value {
    if let Ok(text) = row.try_get_unchecked::<Option<String>, _>(index) {
        return text.map(Value::String).unwrap_or(Value::Null);
    }

    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(Value::Bytes)
        .unwrap_or(Value::Null)
}
