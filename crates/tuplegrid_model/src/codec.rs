//! CBOR storage form of tuples and association rows.
//!
//! Stores that keep bytes instead of structured values (the cache dialect,
//! remote caches) encode through this module. Column maps are `BTreeMap`s, so
//! identical column sets always encode to identical bytes.

use crate::association::Association;
use crate::error::{ModelError, ModelResult};
use crate::key::RowKey;
use crate::tuple::{SnapshotType, Tuple};
use crate::value::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Encode any serialisable value to CBOR bytes.
///
/// # Errors
///
/// Returns [`ModelError::Serialize`] if serialisation fails.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> ModelResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(ModelError::serialize)?;
    Ok(buffer)
}

/// Decode CBOR bytes into `T`.
///
/// # Errors
///
/// Returns [`ModelError::Deserialize`] if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ModelResult<T> {
    ciborium::de::from_reader(bytes).map_err(ModelError::deserialize)
}

/// Trait for model objects stored as CBOR bytes.
pub trait Encode {
    /// Encode to CBOR bytes.
    fn encode(&self) -> ModelResult<Vec<u8>>;
}

/// Trait for model objects restored from CBOR bytes.
pub trait Decode: Sized {
    /// Decode from CBOR bytes.
    fn decode(bytes: &[u8]) -> ModelResult<Self>;
}

/// Stored form of one tuple: its effective columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTuple {
    /// Column values, sorted by name.
    pub columns: BTreeMap<String, Value>,
}

impl StoredTuple {
    /// Captures the effective state of `tuple`.
    pub fn from_tuple(tuple: &Tuple) -> Self {
        Self {
            columns: tuple.to_column_map(),
        }
    }

    /// Rebuilds a loaded tuple.
    pub fn into_tuple(self) -> Tuple {
        Tuple::from_columns(self.columns, SnapshotType::Update)
    }
}

impl Encode for Tuple {
    fn encode(&self) -> ModelResult<Vec<u8>> {
        to_canonical_cbor(&StoredTuple::from_tuple(self))
    }
}

impl Decode for Tuple {
    fn decode(bytes: &[u8]) -> ModelResult<Self> {
        from_cbor::<StoredTuple>(bytes).map(StoredTuple::into_tuple)
    }
}

/// Stored form of one association row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Row key column names.
    pub key_columns: Vec<String>,
    /// Row key values, parallel to `key_columns`.
    pub key_values: Vec<Value>,
    /// Row value columns.
    pub columns: BTreeMap<String, Value>,
}

/// Stored form of an association: the owning table plus its rows in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAssociation {
    /// Association table name.
    pub table: String,
    /// Rows in iteration order.
    pub rows: Vec<StoredRow>,
}

impl StoredAssociation {
    /// Captures the effective rows of `association` stored in `table`.
    pub fn from_association(table: &str, association: &Association) -> Self {
        let rows = association
            .rows()
            .into_iter()
            .map(|(key, tuple)| StoredRow {
                key_columns: key.column_names().to_vec(),
                key_values: key.column_values().to_vec(),
                columns: tuple.to_column_map(),
            })
            .collect();
        Self {
            table: table.to_string(),
            rows,
        }
    }

    /// Rebuilds the rows in stored order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedRow`] if a row key has mismatched
    /// column names and values.
    pub fn into_rows(self) -> ModelResult<Vec<(RowKey, Tuple)>> {
        let table = self.table;
        self.rows
            .into_iter()
            .map(|row| {
                if row.key_columns.len() != row.key_values.len() {
                    return Err(ModelError::MalformedRow {
                        table: table.clone(),
                        key_columns: row.key_columns.len(),
                        key_values: row.key_values.len(),
                    });
                }
                let key = RowKey::new(table.as_str(), row.key_columns, row.key_values);
                Ok((key, Tuple::from_columns(row.columns, SnapshotType::Update)))
            })
            .collect()
    }
}
