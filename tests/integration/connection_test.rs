//! Connection integration tests.
//!
//! Tests pool construction and acquisition failures.

use tidb_query::config::PoolConfig;
use tidb_query::{ExecutorError, QueryExecutor};

#[tokio::test]
async fn test_construction_opens_no_connection() {
    // Nothing listens here; construction must still succeed.
    let config = PoolConfig {
        host: Some("127.0.0.1".to_string()),
        port: Some(1),
        acquire_timeout_secs: 1,
        ..Default::default()
    };

    let executor = QueryExecutor::new(&config);
    assert!(executor.is_ok());
}

#[tokio::test]
async fn test_invalid_pool_options_are_fatal() {
    let config = PoolConfig {
        max_connections: 0,
        ..Default::default()
    };

    let result = QueryExecutor::new(&config);
    assert!(matches!(result, Err(ExecutorError::Config(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn test_unreachable_server_is_acquisition_error() {
    let config = PoolConfig {
        host: Some("127.0.0.1".to_string()),
        port: Some(1),
        acquire_timeout_secs: 2,
        ..Default::default()
    };
    let executor = QueryExecutor::new(&config).unwrap();

    let err = executor.execute("SELECT 1", false).await.unwrap_err();

    assert!(
        matches!(err, ExecutorError::Acquisition(_)),
        "Expected acquisition error, got: {err:?}"
    );
    assert_eq!(err.category(), "Connection Error");

    executor.close().await;
}

#[tokio::test]
async fn test_closed_executor_cannot_acquire() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let config = PoolConfig::from_connection_string(&url).unwrap();
    let executor = QueryExecutor::new(&config).unwrap();

    executor.execute("SELECT 1", false).await.unwrap();
    executor.close().await;

    let err = executor.execute("SELECT 1", false).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Acquisition(sqlx::Error::PoolClosed)));
}
