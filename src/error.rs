//! Error types for tweet-backfill
//!
//! This module provides the error handling for the library:
//! - [`Error`], the crate-wide error returned by sessions and the database layer
//! - [`DatabaseError`], the persistence-specific failures
//! - [`FetchError`], the closed set of failures a fetch collaborator may report
//!
//! Fetch failures never surface as [`Error`]. They are classified into an
//! [`Outcome`](crate::retry::Outcome) at the fetch boundary and drive the
//! per-target retry loop instead.

use thiserror::Error;

/// Result type alias for tweet-backfill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tweet-backfill
///
/// Every variant except [`Error::RelayPoolExhausted`] and [`Error::Config`] is
/// an infrastructure failure. Those two are the session-level fatal conditions.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "session.max_fails")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The relay source has no eligible endpoint left to hand out
    #[error("relay pool exhausted: no eligible relay endpoints available")]
    RelayPoolExhausted,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Machine-readable error code, used as a structured logging field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::RelayPoolExhausted => "relay_pool_exhausted",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether this error must stop the whole session rather than a single target
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::RelayPoolExhausted)
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Failure reported by a fetch collaborator
///
/// This is the only error vocabulary the orchestrator understands from the
/// fetch side. Implementations map their transport-specific errors into one of
/// these variants; the `From` impls below cover `std::io` and `reqwest`.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request did not complete in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// The remote side or the relay dropped the connection
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The relay refused or failed to tunnel the request
    #[error("relay error: {0}")]
    Relay(String),

    /// Anything that does not fit the categories above
    #[error("unknown fetch failure: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::TimedOut => FetchError::Timeout(e.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => FetchError::Disconnected(e.to_string()),
            ErrorKind::ConnectionRefused => FetchError::Relay(e.to_string()),
            _ => FetchError::Unknown(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Relay(e.to_string())
        } else if e.is_request() || e.is_body() {
            FetchError::Disconnected(e.to_string())
        } else {
            FetchError::Unknown(e.to_string())
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_cover_every_variant() {
        let cases = vec![
            (Error::config("session.max_fails", "must be > 0"), "config_error"),
            (
                Error::Database(DatabaseError::QueryFailed("locked".into())),
                "database_error",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (Error::RelayPoolExhausted, "relay_pool_exhausted"),
            (Error::Other("boom".into()), "internal_error"),
        ];

        for (err, code) in cases {
            assert_eq!(err.error_code(), code, "wrong code for {err}");
        }
    }

    #[test]
    fn only_config_and_pool_exhaustion_are_fatal() {
        assert!(Error::config("session.worker_count", "zero").is_fatal());
        assert!(Error::RelayPoolExhausted.is_fatal());
        assert!(!Error::Other("x".into()).is_fatal());
        assert!(!Error::Database(DatabaseError::NotFound("relay".into())).is_fatal());
    }

    #[test]
    fn config_error_keeps_key() {
        match Error::config("retry.max_backoff", "too small") {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("retry.max_backoff"));
                assert_eq!(message, "too small");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn io_errors_map_to_fetch_categories() {
        let timeout: FetchError =
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(timeout, FetchError::Timeout(_)));

        let reset: FetchError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer").into();
        assert!(matches!(reset, FetchError::Disconnected(_)));

        let refused: FetchError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(refused, FetchError::Relay(_)));

        let denied: FetchError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(denied, FetchError::Unknown(_)));
    }
}
