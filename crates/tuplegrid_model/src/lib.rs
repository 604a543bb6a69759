//! # TupleGrid Model
//!
//! Backend-neutral data model shared by every TupleGrid dialect.
//!
//! - [`Value`]: a dynamic, totally ordered column value
//! - Keys: [`EntityKey`], [`AssociationKey`], [`RowKey`] and [`IdSourceKey`]
//!   with their static metadata
//! - [`Tuple`]: a snapshot of stored columns plus a change log
//! - [`Association`]: a keyed collection of row tuples plus a change log
//! - [`codec`]: CBOR storage form for byte-oriented stores
//!
//! ## Usage
//!
//! ```
//! use tuplegrid_model::{EntityKey, EntityKeyMetadata, Tuple, Value};
//!
//! let key = EntityKey::new(
//!     EntityKeyMetadata::new("Shipment", ["id"]),
//!     vec![Value::from("shipment-1")],
//! );
//! let mut tuple = Tuple::new();
//! tuple.put("state", "INITIAL");
//! tuple.put("state", "PROCESSING");
//!
//! assert_eq!(key.table(), "Shipment");
//! assert_eq!(tuple.get("state"), Some(Value::from("PROCESSING")));
//! assert_eq!(tuple.operations().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod association;
pub mod codec;
mod error;
mod key;
mod tuple;
mod value;

pub use association::{
    Association, AssociationOperation, AssociationSnapshot, MapAssociationSnapshot,
};
pub use codec::{from_cbor, to_canonical_cbor, Decode, Encode};
pub use error::{ModelError, ModelResult};
pub use key::{
    AssociationKey, AssociationKeyMetadata, AssociationKeyMetadataBuilder, AssociationKind,
    EntityKey, EntityKeyMetadata, IdSourceKey, IdSourceKeyMetadata, IdSourceType, RowKey,
};
pub use tuple::{
    EmptyTupleSnapshot, MapTupleSnapshot, SnapshotType, Tuple, TupleOperation, TuplePointer,
    TupleSnapshot,
};
pub use value::Value;
