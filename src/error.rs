//! Error types for Hangar.

use thiserror::Error;

use crate::storage::StorageError;

/// Common error type for Hangar.
#[derive(Error, Debug)]
pub enum HangarError {
    /// Database error.
    ///
    /// A statement failed but the store itself is still reachable.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    ///
    /// The store could not be opened or is no longer reachable. There is no
    /// in-memory fallback, so callers should treat this as fatal.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credentials did not match.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Resource not found, or not owned by the requester.
    #[error("{0} not found")]
    NotFound(String),

    /// The reservation would exceed the user's storage quota.
    #[error("storage quota exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded {
        /// Bytes the operation asked for.
        requested: i64,
        /// Bytes left in the budget at the time of the check.
        available: i64,
    },

    /// The content type is not on the upload allow-list.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The file existed but is past its expiry time.
    #[error("{0} has expired")]
    Gone(String),

    /// The requester lacks ownership, admin role or a valid direct link.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness or reference conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation is not available for this kind of resource.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HangarError {
    /// Whether the process should stop rather than answer the request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HangarError::DatabaseConnection(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for HangarError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                HangarError::DatabaseConnection(e.to_string())
            }
            other => HangarError::Database(other.to_string()),
        }
    }
}

/// Result type alias for Hangar operations.
pub type Result<T> = std::result::Result<T, HangarError>;
