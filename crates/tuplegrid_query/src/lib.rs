//! # TupleGrid Query
//!
//! Translation of backend-neutral predicate trees into native queries.
//!
//! The host builds a [`QueryTree`] from its parsed query. A
//! [`QueryTranslator`] resolves property paths through a [`PropertyHelper`],
//! pushes negations down to the leaves, and hands each node to a
//! [`PredicateFactory`]. Four factories ship with the crate:
//!
//! - [`DocumentPredicateFactory`]: Mongo-style JSON filters
//! - [`CypherPredicateFactory`]: Cypher `MATCH` queries
//! - [`IcklePredicateFactory`]: Ickle strings for remote caches
//! - [`MemoryPredicateFactory`]: evaluable [`TupleFilter`]s
//!
//! Translation is pure: the same tree and mapping always give the same query.
//!
//! ## Usage
//!
//! ```
//! use tuplegrid_query::{
//!     CypherPredicateFactory, EntityMapping, MappingRegistry, Predicate, QueryTranslator,
//!     QueryTree,
//! };
//!
//! let mapping = MappingRegistry::new().with(EntityMapping::new("IndexedEntity"));
//! let tree = QueryTree::from_entity("IndexedEntity").filter(Predicate::like("title", "Ali_e%"));
//! let query = QueryTranslator::new(&mapping)
//!     .translate(&tree, &CypherPredicateFactory::new("e"))
//!     .unwrap();
//!
//! assert_eq!(
//!     query.query,
//!     r#"MATCH (e:IndexedEntity) WHERE e.title=~"^\\QAli\\E.\\Qe\\E.*$" RETURN e"#
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cypher;
pub mod document;
mod error;
pub mod ickle;
mod like;
pub mod memory;
mod predicate;
mod property;

pub use cypher::CypherPredicateFactory;
pub use document::{DocumentPredicateFactory, DocumentQuery};
pub use error::{QueryError, QueryResult};
pub use ickle::IcklePredicateFactory;
pub use like::{LikePattern, LikeSegment};
pub use memory::{MemoryPredicateFactory, MemoryQuery, TupleFilter};
pub use predicate::{
    ComparisonType, Predicate, PredicateFactory, PredicateValue, QueryDescriptor,
    QueryParameters, QueryTranslator, QueryTree, RootContext, SortColumn, SortOrder,
};
pub use property::{
    Column, Discriminator, EntityMapping, MappingRegistry, PropertyHelper, PropertyPath,
};
