//! Error types for persistence operations.

use std::fmt;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug)]
pub enum PersistenceError {
    ConnectionFailed(String),
    QueryFailed(String),
    MigrationFailed(String),
    InvalidConfig(String),
    SerializationError(String),
    BackendError(String),
    IoError(std::io::Error),
    UnhealthyBackend(String),
    /// The endpoint row referenced by a check-result insert no longer
    /// exists. Treated as expected by the worker, never surfaced as a
    /// failure to the caller's retry logic.
    ForeignKeyViolation(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to persistence backend: {}", msg)
            }
            PersistenceError::QueryFailed(msg) => write!(f, "persistence query failed: {}", msg),
            PersistenceError::MigrationFailed(msg) => {
                write!(f, "database migration failed: {}", msg)
            }
            PersistenceError::InvalidConfig(msg) => {
                write!(f, "invalid persistence configuration: {}", msg)
            }
            PersistenceError::SerializationError(msg) => {
                write!(f, "row serialization error: {}", msg)
            }
            PersistenceError::BackendError(msg) => write!(f, "persistence backend error: {}", msg),
            PersistenceError::IoError(err) => write!(f, "I/O error: {}", err),
            PersistenceError::UnhealthyBackend(msg) => {
                write!(f, "persistence backend unhealthy: {}", msg)
            }
            PersistenceError::ForeignKeyViolation(msg) => {
                write!(f, "referenced endpoint no longer exists: {}", msg)
            }
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::IoError(err)
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => PersistenceError::IoError(io_err),
            sqlx::Error::RowNotFound => {
                PersistenceError::QueryFailed("no rows found".to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                PersistenceError::ForeignKeyViolation(db_err.message().to_string())
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for PersistenceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        PersistenceError::MigrationFailed(err.to_string())
    }
}
