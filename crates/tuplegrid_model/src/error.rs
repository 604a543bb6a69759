//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Failures turning stored bytes into tuples and associations, or back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A tuple or association could not be written as CBOR.
    #[error("cannot serialize stored form: {message}")]
    Serialize {
        /// Underlying codec message.
        message: String,
    },

    /// Stored bytes are not a valid CBOR document of the expected type.
    #[error("cannot deserialize stored form: {message}")]
    Deserialize {
        /// Underlying codec message.
        message: String,
    },

    /// A stored association row whose key columns and values disagree.
    #[error("malformed row in {table}: {key_columns} key columns, {key_values} values")]
    MalformedRow {
        /// Association table.
        table: String,
        /// Number of key column names.
        key_columns: usize,
        /// Number of key values.
        key_values: usize,
    },
}

impl ModelError {
    pub(crate) fn serialize(err: impl std::fmt::Display) -> Self {
        Self::Serialize {
            message: err.to_string(),
        }
    }

    pub(crate) fn deserialize(err: impl std::fmt::Display) -> Self {
        Self::Deserialize {
            message: err.to_string(),
        }
    }
}
