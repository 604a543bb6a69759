//! # TupleGrid Datastores
//!
//! Reference datastores and their dialects.
//!
//! - [`MapDialect`] keeps structured rows in a shared [`MapDatastore`]. It
//!   detects duplicate inserts by look-up and answers in-memory queries,
//!   stored procedures and multigets. It can also embed association rows in
//!   their owning entity.
//! - [`CacheDialect`] keeps CBOR-encoded rows in named caches laid out by a
//!   [`PersistenceStrategy`](tuplegrid_core::PersistenceStrategy). It rejects
//!   duplicate inserts natively, applies batches and supports versioned
//!   writes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod map;

pub use cache::{cache_dialect, CacheDialect, CacheKey};
pub use map::{MapDatastore, MapDialect};

use std::collections::BTreeMap;
use tuplegrid_model::{TupleOperation, Value};

/// Folds tuple operations into a stored column map.
pub(crate) fn apply_operations(
    columns: &mut BTreeMap<String, Value>,
    operations: impl IntoIterator<Item = TupleOperation>,
) {
    for operation in operations {
        match operation {
            TupleOperation::Put { column, value } => {
                columns.insert(column, value);
            }
            TupleOperation::PutNull { column } => {
                columns.insert(column, Value::Null);
            }
            TupleOperation::Remove { column } => {
                columns.remove(&column);
            }
        }
    }
}
