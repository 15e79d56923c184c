//! Error types for repokit
//!
//! [`Error`] covers bootstrap failures (configuration, connections, I/O).
//! Repository calls report the structured
//! [`RepositoryError`](crate::repository::RepositoryError); this module also
//! holds the driver conversions into it.

use crate::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// A repository operation failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A backend connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

// Conversion from sqlx::Error to RepositoryError
#[cfg(feature = "database")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        let op = RepositoryOperation::FindAll;
        match err {
            E::RowNotFound => Self::new(op, RepositoryErrorKind::NotFound, "Row not found"),
            E::PoolTimedOut => Self::new(
                op,
                RepositoryErrorKind::ConnectionFailed,
                "Connection pool timed out",
            ),
            E::PoolClosed => Self::connection_failed("Connection pool is closed"),
            E::WorkerCrashed => Self::connection_failed("Database worker crashed"),
            E::Io(e) => Self::connection_failed(e.to_string()),
            E::Tls(e) => Self::connection_failed(format!("TLS error: {}", e)),
            E::Configuration(e) => Self::connection_failed(e.to_string()),
            E::ColumnNotFound(col) => {
                Self::serialization_error(op, format!("Column not found: {}", col))
            }
            E::ColumnDecode { index, source } => Self::serialization_error(
                op,
                format!("Failed to decode column {}: {}", index, source),
            ),
            E::Decode(e) => Self::serialization_error(op, e.to_string()),
            E::Encode(e) => Self::serialization_error(op, e.to_string()),
            E::Database(db_err) => {
                let kind = if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    RepositoryErrorKind::InvalidArgument
                } else {
                    RepositoryErrorKind::DatabaseError
                };
                Self::new(op, kind, db_err.to_string())
            }
            other => Self::database_error(op, other.to_string()),
        }
    }
}

// Conversion from surrealdb::Error to RepositoryError
#[cfg(feature = "surrealdb")]
impl From<surrealdb::Error> for RepositoryError {
    fn from(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        let op = RepositoryOperation::FindAll;

        let kind = if lowered.contains("already contains")
            || lowered.contains("must conform")
            || lowered.contains("invalid")
            || lowered.contains("parse error")
        {
            RepositoryErrorKind::InvalidArgument
        } else if lowered.contains("timeout") || lowered.contains("timed out") {
            RepositoryErrorKind::Timeout
        } else if lowered.contains("connection")
            || lowered.contains("connect")
            || lowered.contains("refused")
        {
            RepositoryErrorKind::ConnectionFailed
        } else if lowered.contains("deserializ") || lowered.contains("serializ") {
            RepositoryErrorKind::SerializationError
        } else {
            RepositoryErrorKind::DatabaseError
        };

        Self::new(op, kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_is_transparent() {
        let err = Error::from(RepositoryError::not_found("User", "7"));
        assert_eq!(
            err.to_string(),
            "Repository not_found error during find_by_id: Model not found [User: 7]"
        );
    }

    #[test]
    fn test_config_error_is_boxed() {
        let err = Error::from(figment::Error::from("bad value".to_string()));
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[cfg(feature = "database")]
    #[test]
    fn test_sqlx_error_conversion() {
        let err = RepositoryError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind, RepositoryErrorKind::ConnectionFailed);
        assert!(err.is_retriable());

        let err = RepositoryError::from(sqlx::Error::ColumnNotFound("text".to_string()));
        assert_eq!(err.kind, RepositoryErrorKind::SerializationError);
    }
}
