//! Error types for quire.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using quire's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for quire operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed and was not classified further.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Foreign key, check or not-null constraint rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Unique constraint rejected the write.
    #[error("Unique violation: {0}")]
    UniqueViolation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Stored data could not be decoded into a domain value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Content provider could not deliver a document.
    #[error("Content provider error: {0}")]
    Provider(String),
}

/// Stable machine-readable error classification.
///
/// Callers branch on the code rather than on the variant so that new variants
/// can be added without breaking retry or presentation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ConstraintViolation,
    UniqueViolation,
    DatabaseError,
    InvalidInput,
    ConfigError,
    ProviderError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ConstraintViolation => "CONSTRAINT_VIOLATION",
            ErrorCode::UniqueViolation => "UNIQUE_VIOLATION",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify a driver error by the database's native error kind.
    ///
    /// PostgreSQL reports integrity failures with SQLSTATE class 23; sqlx
    /// exposes the relevant members through [`sqlx::error::ErrorKind`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db_err) = &err {
            let message = match db_err.constraint() {
                Some(constraint) => format!("{} ({})", db_err.message(), constraint),
                None => db_err.message().to_string(),
            };
            match db_err.kind() {
                ErrorKind::ForeignKeyViolation
                | ErrorKind::CheckViolation
                | ErrorKind::NotNullViolation => return Error::ConstraintViolation(message),
                ErrorKind::UniqueViolation => return Error::UniqueViolation(message),
                _ => {}
            }
        }
        Error::Database(err)
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound(_) | Error::NoteNotFound(_) => ErrorCode::NotFound,
            Error::ConstraintViolation(_) => ErrorCode::ConstraintViolation,
            Error::UniqueViolation(_) => ErrorCode::UniqueViolation,
            Error::Database(_) | Error::Serialization(_) => ErrorCode::DatabaseError,
            Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::Config(_) => ErrorCode::ConfigError,
            Error::Provider(_) => ErrorCode::ProviderError,
        }
    }

    /// True when the error means the requested row does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
