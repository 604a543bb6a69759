//! Error types for TupleGrid core.

use std::fmt;
use thiserror::Error;
use tuplegrid_model::ModelError;
use tuplegrid_query::QueryError;

/// Result type for core operations.
pub type GridResult<T> = Result<T, GridError>;

/// Errors raised by dialects and the flush driver.
///
/// A missing row is not an error: reads return `None`.
#[derive(Debug, Error)]
pub enum GridError {
    /// An insert hit an existing row with the same key.
    #[error("entity already exists: {key}")]
    EntityAlreadyExists {
        /// Rendered entity key.
        key: String,
    },

    /// A versioned write found a different version than expected.
    #[error("optimistic lock failure on {key}")]
    OptimisticLockFailure {
        /// Rendered entity key.
        key: String,
    },

    /// The store failed or could not be reached.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The dialect does not support the requested operation.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Operation name.
        operation: String,
    },

    /// An argument was out of range or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A mass scan was cancelled.
    #[error("scan cancelled")]
    Cancelled,

    /// Encoding or decoding of stored data failed.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Query translation or evaluation failed.
    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

impl GridError {
    /// Creates a duplicate key error.
    pub fn entity_already_exists(key: impl fmt::Display) -> Self {
        Self::EntityAlreadyExists {
            key: key.to_string(),
        }
    }

    /// Creates an optimistic lock failure.
    pub fn optimistic_lock_failure(key: impl fmt::Display) -> Self {
        Self::OptimisticLockFailure {
            key: key.to_string(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Whether an error handler may ask to continue past this error.
    ///
    /// Duplicate keys, lock conflicts and unsupported operations always abort.
    pub fn allows_continue(&self) -> bool {
        !matches!(
            self,
            Self::EntityAlreadyExists { .. }
                | Self::OptimisticLockFailure { .. }
                | Self::UnsupportedOperation { .. }
        )
    }
}
