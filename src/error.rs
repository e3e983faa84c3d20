//! Error types for tidb-query.
//!
//! Driver failures are carried as the original `sqlx::Error` so callers can
//! inspect the cause exactly as the database reported it.

use thiserror::Error;

/// Main error type for executor operations.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The pool could not yield a connection (exhaustion, network failure, etc.)
    #[error("Failed to establish a connection: {0}")]
    Acquisition(#[source] sqlx::Error),

    /// The main or prepared query failed. Display and source are the driver's own.
    #[error(transparent)]
    Query(sqlx::Error),

    /// Configuration errors (invalid config file, unusable pool options, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (output encoding, unexpected states, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutorError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Acquisition(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the underlying driver error, if this error came from the driver.
    pub fn driver_error(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Acquisition(e) | Self::Query(e) => Some(e),
            Self::Config(_) | Self::Internal(_) => None,
        }
    }

    /// The server's error code (e.g. `1146`), when the database rejected the call.
    pub fn server_code(&self) -> Option<String> {
        self.driver_error()?
            .as_database_error()?
            .code()
            .map(|code| code.into_owned())
    }
}

/// Result type alias using ExecutorError.
pub type Result<T> = std::result::Result<T, ExecutorError>;
