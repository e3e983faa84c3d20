//! Pooled query execution.
//!
//! Every call follows the same discipline: acquire a connection (timed),
//! optionally apply the session memory quota, run the statement (timed),
//! normalize field metadata, and hand the connection back on every exit path.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::fields::normalize_fields;
use super::guard::ConnectionGuard;
use crate::config::{Config, LimitsConfig, PoolConfig};
use crate::db::{ConnectionPool, MySqlConnectionPool, PoolConnection, QueryRequest, QueryResult, Value};
use crate::error::{ExecutorError, Result};
use crate::metrics::{ExecutorMetrics, Stopwatch};

/// Tracing target for executor events.
pub const LOG_TARGET: &str = "tidb";

/// Resource ceilings for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Issue `SET SESSION tidb_mem_quota_query` with this many bytes first.
    pub memory_quota: Option<u64>,

    /// Driver-side timeout for the main statement.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    /// No quota, no timeout.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// The default limited profile: 1 GiB memory quota, 120 s timeout.
    pub fn limited() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }

    /// Builds a limited profile from configuration.
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            memory_quota: Some(limits.memory_quota_bytes),
            timeout: Some(Duration::from_millis(limits.timeout_ms)),
        }
    }

    pub fn with_memory_quota(mut self, bytes: u64) -> Self {
        self.memory_quota = Some(bytes);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The session statement applied before limited queries.
pub fn memory_quota_statement(bytes: u64) -> String {
    format!("SET SESSION tidb_mem_quota_query = {bytes}")
}

/// Query executor that owns a connection pool.
pub struct QueryExecutor<P: ConnectionPool = MySqlConnectionPool> {
    pool: P,
    metrics: ExecutorMetrics,
    limits: QueryOptions,
}

impl QueryExecutor<MySqlConnectionPool> {
    /// Creates an executor with a lazily connecting MySQL pool.
    ///
    /// No connection is opened here; unusable pool options are a `Config` error.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let pool = MySqlConnectionPool::new(config)?;
        Ok(Self::with_pool(pool, ExecutorMetrics::default()))
    }

    /// Creates an executor from a full configuration, including limits.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.pool)?.with_limits(QueryOptions::from_limits(&config.limits)))
    }
}

impl<P: ConnectionPool> QueryExecutor<P> {
    /// Creates an executor over any pool implementation.
    pub fn with_pool(pool: P, metrics: ExecutorMetrics) -> Self {
        Self {
            pool,
            metrics,
            limits: QueryOptions::limited(),
        }
    }

    /// Replaces what `limited = true` means for [`execute`](Self::execute).
    pub fn with_limits(mut self, limits: QueryOptions) -> Self {
        self.limits = limits;
        self
    }

    /// The limits applied by `execute(sql, true)`.
    pub fn limits(&self) -> &QueryOptions {
        &self.limits
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Runs `sql` on a pooled connection.
    ///
    /// With `limited`, the session memory quota is attempted first (a failure
    /// there is only logged) and the statement gets the configured timeout.
    pub async fn execute(&self, sql: &str, limited: bool) -> Result<QueryResult> {
        if limited {
            self.execute_with(sql, &self.limits).await
        } else {
            self.execute_with(sql, &QueryOptions::unlimited()).await
        }
    }

    /// Runs `sql` with explicit options.
    pub async fn execute_with(&self, sql: &str, options: &QueryOptions) -> Result<QueryResult> {
        let mut conn = self.acquire_connection().await?;
        self.run_on_connection(&mut conn, sql, options).await
    }

    /// Runs `sql` with `args` bound positionally by the driver. Unlimited.
    pub async fn prepare(&self, sql: &str, args: &[Value]) -> Result<QueryResult> {
        self.prepare_with(sql, args, &QueryOptions::unlimited()).await
    }

    /// Runs a parameterized statement with explicit options.
    pub async fn prepare_with(
        &self,
        sql: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let mut conn = self.acquire_connection().await?;
        self.run_prepared_on_connection(&mut conn, sql, args, options)
            .await
    }

    /// Closes the pool. Calls made afterwards fail to acquire.
    pub async fn close(&self) {
        info!(target: LOG_TARGET, "Closing connection pool");
        self.pool.close().await;
    }

    async fn acquire_connection(&self) -> Result<ConnectionGuard<P::Connection>> {
        let stopwatch = Stopwatch::start(self.metrics.wait_connection.as_ref());
        let acquired = self.pool.acquire().await;
        stopwatch.stop();

        match acquired {
            Ok(conn) => Ok(ConnectionGuard::new(conn)),
            Err(e) => {
                error!(target: LOG_TARGET, error = %e, "Failed to establish a connection");
                Err(ExecutorError::Acquisition(e))
            }
        }
    }

    async fn run_on_connection(
        &self,
        conn: &mut P::Connection,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let id = conn.id();
        debug!(target: LOG_TARGET, connection = id, "Executing sql by connection<{id}>\n {sql}");

        if let Some(bytes) = options.memory_quota {
            apply_memory_quota(conn, bytes).await;
        }

        let request = QueryRequest::text(sql).with_timeout(options.timeout);
        self.run_timed(conn, request).await
    }

    async fn run_prepared_on_connection(
        &self,
        conn: &mut P::Connection,
        sql: &str,
        args: &[Value],
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let id = conn.id();
        debug!(
            target: LOG_TARGET,
            connection = id,
            params = args.len(),
            "Executing prepared sql by connection<{id}>\n {sql}"
        );

        if let Some(bytes) = options.memory_quota {
            apply_memory_quota(conn, bytes).await;
        }

        let request = QueryRequest::prepared(sql, args).with_timeout(options.timeout);
        self.run_timed(conn, request).await
    }

    /// Runs the main statement. Only this call is covered by the query timer.
    async fn run_timed(
        &self,
        conn: &mut P::Connection,
        request: QueryRequest<'_>,
    ) -> Result<QueryResult> {
        let stopwatch = Stopwatch::start(self.metrics.query.as_ref());
        let outcome = conn.query(request).await;
        stopwatch.stop();

        let raw = outcome.map_err(ExecutorError::Query)?;
        Ok(QueryResult {
            fields: normalize_fields(raw.fields.as_deref()),
            rows: raw.rows,
        })
    }
}

/// Best-effort session memory quota. Failures are logged and swallowed.
async fn apply_memory_quota<C: PoolConnection>(conn: &mut C, bytes: u64) {
    let id = conn.id();
    let statement = memory_quota_statement(bytes);
    let outcome = conn.query(QueryRequest::text(&statement)).await;

    if let Err(e) = outcome {
        warn!(
            target: LOG_TARGET,
            connection = id,
            error = %e,
            "Failed to enable query limit: tidb_mem_quota_query = {bytes}"
        );
    }
}
