//! Error types for stream log and consumer operations

use std::time::Duration;
use thiserror::Error;

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by stream logs, consumers and their lifecycle
#[derive(Debug, Error)]
pub enum Error {
    /// The consumer group already exists (the BUSYGROUP class of error)
    #[error("Consumer group '{group}' already exists on stream '{stream}'")]
    GroupExists { stream: String, group: String },

    /// The consumer group does not exist on the stream
    #[error("No such consumer group '{group}' for stream '{stream}'")]
    NoGroup { stream: String, group: String },

    /// Connection error - log backend unreachable or authentication failure
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Database error - SQL errors, constraint violations
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Pool error - connection pool issues
    #[error("Pool error: {0}")]
    PoolError(String),

    /// Validation error - invalid input data
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Invalid consumer or connection configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The supervisor loop gave up after too many consecutive failed passes
    #[error("max retries ({retries}) exceeded: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<Error>,
    },

    /// Graceful shutdown did not complete within the given bound
    #[error("shutdown timeout exceeded after {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    /// The downstream receiver of decoded events was dropped
    #[error("output channel closed by receiver")]
    OutputClosed,

    /// `start` was called on a consumer that was already started
    #[error("consumer already started")]
    AlreadyStarted,

    /// A lifecycle call that needs a running consumer was made before `start`
    #[error("consumer not started")]
    NotStarted,

    /// The supervisor task panicked or was aborted
    #[error("consumer task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Whether this is the "group already exists" class of error
    pub fn is_group_exists(&self) -> bool {
        matches!(self, Error::GroupExists { .. })
    }

    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ConnectionError(_) | Error::DatabaseError(_) | Error::PoolError(_)
        )
    }
}

/// Errors produced while decoding a [`StreamRecord`](crate::stream::types::StreamRecord)
#[derive(Debug, Error)]
pub enum ParseError {
    /// A required field is absent from the record
    #[error("missing '{0}' field in message")]
    MissingField(String),

    /// A field is present but its value cannot be converted
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// JSON payload could not be decoded
    #[error("failed to unmarshal payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other decoder-specific failure
    #[error("{0}")]
    Other(String),
}

/// Convert tokio-postgres errors to stream errors
impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_error) = err.as_db_error() {
            return Error::DatabaseError(format!(
                "{}: {}",
                db_error.code().code(),
                db_error.message()
            ));
        }

        if err.is_closed() {
            return Error::ConnectionError(err.to_string());
        }

        Error::DatabaseError(format!("{:?}", err))
    }
}

/// Convert deadpool errors to stream errors
impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Error::PoolError(err.to_string())
    }
}

/// Convert deadpool build errors to stream errors
impl From<deadpool_postgres::BuildError> for Error {
    fn from(err: deadpool_postgres::BuildError) -> Self {
        Error::ConnectionError(err.to_string())
    }
}

/// Convert JSON errors to stream errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ValidationError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_exists_classification() {
        let err = Error::GroupExists {
            stream: "stats:events".to_string(),
            group: "stats-service".to_string(),
        };
        assert!(err.is_group_exists());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_retries_exhausted_keeps_source() {
        let err = Error::RetriesExhausted {
            retries: 3,
            source: Box::new(Error::ConnectionError("reset by peer".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("max retries (3) exceeded"));
        assert!(msg.contains("reset by peer"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_shutdown_timeout_is_distinct() {
        let err = Error::ShutdownTimeout {
            timeout: Duration::from_secs(5),
        };
        assert!(!matches!(err, Error::RetriesExhausted { .. }));
        assert!(err.to_string().contains("shutdown timeout"));
    }

    #[test]
    fn test_parse_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ParseError = json_err.into();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_missing_field_message() {
        let err = ParseError::MissingField("data".to_string());
        assert_eq!(err.to_string(), "missing 'data' field in message");
    }
}
