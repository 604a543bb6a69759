//! # TupleGrid Core
//!
//! The contract between the mapping core and NoSQL datastores.
//!
//! This crate provides:
//! - The [`GridDialect`] trait and its optional facets
//! - Forwarding, batching and invocation-collecting dialect wrappers
//! - The per-transaction operation log and failure reporting
//! - Linearizable counters for identifier generation
//! - A parallel producer/consumer scan over every tuple of a table
//! - Key mapping and cache layout for key/value stores
//! - [`Grid`] and [`Session`]: units of work flushed through a dialect
//!
//! ## Usage
//!
//! ```ignore
//! let grid = Grid::new(dialect, GridConfig::default());
//! grid.transaction(|session| {
//!     let mut tuple = Tuple::new();
//!     tuple.put("state", "INITIAL");
//!     session.insert(key, tuple);
//!     Ok(())
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
pub mod dialect;
mod error;
mod failure;
mod id;
mod procedures;
mod query;
mod scan;
mod session;
pub mod strategy;
mod types;

pub use config::{GridConfig, MassScanConfig};
pub use context::TransactionContext;
pub use dialect::{
    BatchOperationsDelegator, BatchableGridDialect, DialectFacet,
    DuplicateInsertPreventionStrategy, ForwardingGridDialect, GridDialect, GridDialectOperation,
    GridDialects, InvocationCollectingGridDialect, MultigetGridDialect, OperationKind,
    OperationLog, OperationsQueue, OptimisticLockingAwareGridDialect, QueryableGridDialect,
    StoredProcedureAwareGridDialect,
};
pub use error::{GridError, GridResult};
pub use failure::{
    ErrorHandler, ErrorHandlingStrategy, FailedOperationContext, LoggingErrorHandler,
    RollbackContext,
};
pub use id::{AtomicCounters, NextValueRequest, SequenceDefinition};
pub use procedures::{ProcedureParameters, StoredProcedure, StoredProcedureRegistry};
pub use query::{BackendQuery, RowSelection};
pub use scan::{CancellationToken, ModelConsumer, ParallelTupleScan};
pub use session::{Grid, Session};
pub use strategy::{
    CacheManager, CacheMappingType, KeyProvider, PerKindKeyProvider, PerTableKeyProvider,
    PersistenceStrategy, PersistentAssociationKey, PersistentEntityKey, PersistentIdSourceKey,
};
pub use types::TransactionId;
