//! Query execution integration tests.
//!
//! Tests SQL execution against a real server and result handling.

use tidb_query::config::PoolConfig;
use tidb_query::db::{Rows, Value};
use tidb_query::{ExecutorError, QueryExecutor, QueryOptions};

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a test executor.
fn get_test_executor() -> Option<QueryExecutor> {
    let url = get_test_database_url()?;
    let config = PoolConfig::from_connection_string(&url).ok()?;
    QueryExecutor::new(&config).ok()
}

#[tokio::test]
async fn test_execute_simple_select() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = executor
        .execute("SELECT 1 AS num, 'hello' AS greeting", false)
        .await
        .unwrap();

    assert_eq!(result.fields.len(), 2);
    assert_eq!(result.fields[0].name, "num");
    assert_eq!(result.fields[0].column_type, 8);
    assert_eq!(result.fields[1].name, "greeting");
    match result.rows {
        Rows::Records(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get("num"), Some(&Value::Int(1)));
        }
        other => panic!("Expected Records, got {:?}", other),
    }

    executor.close().await;
}

#[tokio::test]
async fn test_execute_limited_select() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    // On plain MySQL the quota statement fails and is only logged.
    let result = executor.execute("SELECT 1 AS x", true).await.unwrap();
    assert_eq!(result.fields.len(), 1);

    executor.close().await;
}

#[tokio::test]
async fn test_write_returns_ack_without_fields() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = executor.execute("DO 1", false).await.unwrap();
    assert!(result.fields.is_empty());
    assert!(result.rows.as_ack().is_some());

    executor.close().await;
}

#[tokio::test]
async fn test_empty_select_returns_columns_not_ack() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = executor
        .execute("SELECT 1 AS x FROM DUAL WHERE 1 = 0", false)
        .await
        .unwrap();

    assert_eq!(result.rows, Rows::Records(vec![]));
    assert_eq!(result.fields.len(), 1);
    assert_eq!(result.fields[0].name, "x");

    executor.close().await;
}

#[tokio::test]
async fn test_prepare_with_metacharacters() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let hostile = Value::from("1'; DROP TABLE users; --");
    let result = executor
        .prepare("SELECT ? AS echoed, ? + 1 AS next", &[hostile.clone(), Value::Int(41)])
        .await
        .unwrap();

    match result.rows {
        Rows::Records(rows) => {
            assert_eq!(rows[0].get("echoed"), Some(&hostile));
        }
        other => panic!("Expected Records, got {:?}", other),
    }

    executor.close().await;
}

#[tokio::test]
async fn test_execute_with_error() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = executor
        .execute("SELECT * FROM nonexistent_table_xyz", false)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Query(sqlx::Error::Database(_))));
    assert!(err.to_string().contains("nonexistent_table_xyz"));

    // The connection went back to the pool and is usable again.
    executor.execute("SELECT 1", false).await.unwrap();

    executor.close().await;
}

#[tokio::test]
async fn test_timeout_cancels_long_query() {
    let Some(executor) = get_test_executor() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let options = QueryOptions::unlimited().with_timeout(std::time::Duration::from_millis(200));
    let err = executor
        .execute_with("SELECT SLEEP(5)", &options)
        .await
        .unwrap_err();

    match err {
        ExecutorError::Query(sqlx::Error::Io(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::TimedOut)
        }
        other => panic!("Expected timeout, got {:?}", other),
    }

    executor.close().await;
}
