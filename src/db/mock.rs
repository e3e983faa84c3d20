//! Mock connection pool for testing.
//!
//! Provides a scripted in-memory pool that counts acquisitions and releases
//! and records every request it sees.

use super::{ConnectionPool, DriverResult, PoolConnection, QueryRequest, RawResult, Value};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What the mock answers for a matching statement.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Succeeds with the given raw result.
    Result(RawResult),
    /// Fails with `sqlx::Error::Protocol(message)`.
    Error(String),
    /// Waits, then answers with the inner response. Honors request timeouts.
    Delayed(Duration, Box<MockResponse>),
}

/// A request observed by a [`MockConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub connection_id: u64,
    pub sql: String,
    pub params: Option<Vec<Value>>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct MockState {
    acquires: AtomicUsize,
    releases: AtomicUsize,
    next_id: AtomicU64,
    fail_acquire: AtomicBool,
    acquire_delay: Mutex<Option<Duration>>,
    closed: AtomicBool,
    rules: Mutex<Vec<(String, MockResponse)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock pool that returns scripted results.
///
/// Statements are matched against rules by substring, first match wins.
/// Unmatched statements succeed with an empty acknowledgment.
#[derive(Debug, Clone, Default)]
pub struct MockPool {
    state: Arc<MockState>,
}

impl MockPool {
    /// Creates a new mock pool with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers statements containing `pattern` with `response`.
    pub fn respond(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        lock(&self.state.rules).push((pattern.into(), response));
        self
    }

    /// Answers statements containing `pattern` with a successful result.
    pub fn respond_ok(self, pattern: impl Into<String>, result: RawResult) -> Self {
        self.respond(pattern, MockResponse::Result(result))
    }

    /// Answers statements containing `pattern` with a protocol error.
    pub fn respond_err(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.respond(pattern, MockResponse::Error(message.into()))
    }

    /// Makes every acquisition fail with `sqlx::Error::PoolTimedOut`.
    pub fn failing_acquire(self) -> Self {
        self.state.fail_acquire.store(true, Ordering::SeqCst);
        self
    }

    /// Makes every acquisition wait `delay` before answering.
    pub fn delayed_acquire(self, delay: Duration) -> Self {
        *lock(&self.state.acquire_delay) = Some(delay);
        self
    }

    /// Number of acquisitions attempted.
    pub fn acquire_count(&self) -> usize {
        self.state.acquires.load(Ordering::SeqCst)
    }

    /// Number of connections handed back.
    pub fn release_count(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn acquire(&self) -> DriverResult<MockConnection> {
        self.state.acquires.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.state.acquire_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_acquire.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            id,
            state: Arc::clone(&self.state),
        })
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// A connection handed out by [`MockPool`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    state: Arc<MockState>,
}

impl MockConnection {
    fn response_for(&self, sql: &str) -> Option<MockResponse> {
        lock(&self.state.rules)
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
    }
}

#[async_trait]
impl PoolConnection for MockConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn query(&mut self, request: QueryRequest<'_>) -> DriverResult<RawResult> {
        lock(&self.state.requests).push(RecordedRequest {
            connection_id: self.id,
            sql: request.sql.to_string(),
            params: request.params.map(<[Value]>::to_vec),
            timeout: request.timeout,
        });

        let mut response = self
            .response_for(request.sql)
            .unwrap_or_else(|| MockResponse::Result(RawResult::ack(0, 0)));

        loop {
            match response {
                MockResponse::Result(result) => return Ok(result),
                MockResponse::Error(message) => return Err(sqlx::Error::Protocol(message)),
                MockResponse::Delayed(delay, inner) => {
                    if let Some(limit) = request.timeout.filter(|limit| *limit < delay) {
                        tokio::time::sleep(limit).await;
                        return Err(sqlx::Error::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("Query timed out after {} ms", limit.as_millis()),
                        )));
                    }
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }

    fn release(self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}
