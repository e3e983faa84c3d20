//! Scoped connection ownership.

use crate::db::PoolConnection;
use std::ops::{Deref, DerefMut};
use tracing::trace;

use super::executor::LOG_TARGET;

/// Holds a pooled connection and releases it exactly once when dropped.
///
/// Dropping covers every exit: normal return, an error, a panic unwinding
/// through the call, or the calling future being cancelled.
pub(crate) struct ConnectionGuard<C: PoolConnection> {
    conn: Option<C>,
}

impl<C: PoolConnection> ConnectionGuard<C> {
    pub(crate) fn new(conn: C) -> Self {
        Self { conn: Some(conn) }
    }
}

impl<C: PoolConnection> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection is held until drop")
    }
}

impl<C: PoolConnection> DerefMut for ConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection is held until drop")
    }
}

impl<C: PoolConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            trace!(target: LOG_TARGET, connection = conn.id(), "Releasing connection");
            conn.release();
        }
    }
}
