//! Executor tests through the public API, backed by the mock pool.

use pretty_assertions::assert_eq;
use std::time::Duration;
use tidb_query::db::{raw_field, FieldMeta, MockPool, RawResult, Row, Rows, Value};
use tidb_query::metrics::ExecutorMetrics;
use tidb_query::{ExecutorError, QueryExecutor};

fn executor(pool: &MockPool) -> QueryExecutor<MockPool> {
    QueryExecutor::with_pool(pool.clone(), ExecutorMetrics::default())
}

#[tokio::test]
async fn test_select_one_scenario() {
    let pool = MockPool::new().respond_ok(
        "SELECT 1 AS x",
        RawResult::with_fields(
            Rows::Records(vec![Row::new().with("x", 1)]),
            vec![raw_field("x", 8)],
        ),
    );
    let executor = executor(&pool);

    let result = executor.execute("SELECT 1 AS x", false).await.unwrap();

    assert_eq!(result.fields, vec![FieldMeta::new("x", 8)]);
    assert_eq!(result.rows, Rows::Records(vec![Row::new().with("x", 1)]));
    assert_eq!(pool.acquire_count(), 1);
    assert_eq!(pool.release_count(), 1);
}

#[tokio::test]
async fn test_json_output_matches_driver_shape() {
    let pool = MockPool::new().respond_ok(
        "SELECT",
        RawResult::with_fields(
            Rows::Records(vec![Row::new().with("x", 1)]),
            vec![raw_field("x", 8)],
        ),
    );

    let result = executor(&pool).execute("SELECT 1 AS x", false).await.unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({
            "fields": [{"name": "x", "columnType": 8}],
            "rows": [{"x": 1}],
        })
    );
}

#[tokio::test]
async fn test_every_call_releases_what_it_acquires() {
    let pool = MockPool::new()
        .respond_err("broken", "You have an error in your SQL syntax")
        .respond_err("tidb_mem_quota_query", "Unknown system variable");
    let executor = executor(&pool);

    let _ = executor.execute("SELECT 1", false).await;
    let _ = executor.execute("SELECT 1", true).await;
    let _ = executor.execute("SELECT broken", false).await;
    let _ = executor.execute("SELECT broken", true).await;
    let _ = executor.prepare("SELECT ?", &[Value::Int(1)]).await;
    let _ = executor.prepare("SELECT broken ?", &[Value::Null]).await;

    assert_eq!(pool.acquire_count(), 6);
    assert_eq!(pool.release_count(), 6);
}

#[tokio::test]
async fn test_limited_timeout_reaches_driver() {
    let pool = MockPool::new();
    let executor = executor(&pool);

    executor.execute("SELECT 1", true).await.unwrap();
    executor.execute("SELECT 2", false).await.unwrap();

    let timeouts: Vec<(String, Option<Duration>)> = pool
        .requests()
        .into_iter()
        .map(|r| (r.sql, r.timeout))
        .collect();
    assert_eq!(
        timeouts,
        vec![
            (
                "SET SESSION tidb_mem_quota_query = 1073741824".to_string(),
                None
            ),
            ("SELECT 1".to_string(), Some(Duration::from_millis(120_000))),
            ("SELECT 2".to_string(), None),
        ]
    );
}

#[tokio::test]
async fn test_acquisition_failure_then_close() {
    let pool = MockPool::new().failing_acquire();
    let executor = executor(&pool);

    let err = executor.execute("SELECT 1", false).await.unwrap_err();
    assert_eq!(err.category(), "Connection Error");
    assert!(matches!(err, ExecutorError::Acquisition(_)));

    executor.close().await;
    assert!(pool.is_closed());
}
