//! Error types for query translation and evaluation.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while translating or evaluating a predicate tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The entity is not known to the property helper.
    #[error("unknown entity: {entity}")]
    UnknownEntity {
        /// Entity name as given by the host.
        entity: String,
    },

    /// A named parameter was referenced but not supplied.
    #[error("missing value for parameter :{name}")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// The predicate tree is malformed (e.g. an empty conjunction).
    #[error("invalid predicate: {message}")]
    InvalidPredicate {
        /// Description of the problem.
        message: String,
    },
}

impl QueryError {
    /// Create an unknown entity error.
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity: entity.into(),
        }
    }

    /// Create a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Create an invalid predicate error.
    pub fn invalid_predicate(message: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            message: message.into(),
        }
    }
}
