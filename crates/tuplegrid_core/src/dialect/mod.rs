//! The dialect contract between the mapping core and a datastore.
//!
//! [`GridDialect`] is the mandatory surface. Optional capabilities are
//! separate traits reached through typed accessors that return `None` when
//! the dialect lacks them:
//!
//! | facet | accessor |
//! |---|---|
//! | [`BatchableGridDialect`] | [`GridDialect::batchable`] |
//! | [`OptimisticLockingAwareGridDialect`] | [`GridDialect::optimistic_locking`] |
//! | [`QueryableGridDialect`] | [`GridDialect::queryable`] |
//! | [`StoredProcedureAwareGridDialect`] | [`GridDialect::stored_procedures`] |
//! | [`MultigetGridDialect`] | [`GridDialect::multiget`] |
//!
//! Every call that belongs to a unit of work takes the
//! [`TransactionContext`] explicitly.

mod batch;
mod forwarding;
mod invocation;
mod operation;

pub use batch::BatchOperationsDelegator;
pub use forwarding::ForwardingGridDialect;
pub use invocation::InvocationCollectingGridDialect;
pub use operation::{GridDialectOperation, OperationKind, OperationLog, OperationsQueue};

use crate::context::TransactionContext;
use crate::error::GridResult;
use crate::id::{NextValueRequest, SequenceDefinition};
use crate::procedures::ProcedureParameters;
use crate::query::{BackendQuery, RowSelection};
use crate::scan::ModelConsumer;
use tuplegrid_model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
    TuplePointer,
};
use tuplegrid_query::QueryParameters;

/// How inserts of an already existing key are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateInsertPreventionStrategy {
    /// The store rejects duplicates itself when the insert is applied.
    Native,
    /// The flush driver reads the key before inserting.
    LookUp,
}

/// Mandatory operations of a datastore dialect.
///
/// A missing row is `Ok(None)`, never an error.
pub trait GridDialect: Send + Sync {
    /// Reads the tuple stored under `key`.
    fn get_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext)
        -> GridResult<Option<Tuple>>;

    /// Creates an empty tuple for a new entity. Nothing is written yet.
    fn create_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<Tuple>;

    /// Applies the tuple's changes to the store.
    ///
    /// The dialect may replace the pointed-to tuple, typically with one whose
    /// snapshot reflects the applied state.
    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &mut TuplePointer,
        ctx: &mut TransactionContext,
    ) -> GridResult<()>;

    /// Removes the tuple stored under `key`. Removing a missing key is a no-op.
    fn remove_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<()>;

    /// Reads an association.
    fn get_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Association>>;

    /// Creates an empty association. Nothing is written yet.
    fn create_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Association>;

    /// Applies the association's changes to the store.
    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &mut Association,
        ctx: &mut TransactionContext,
    ) -> GridResult<()>;

    /// Removes an association.
    fn remove_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<()>;

    /// Whether the association is embedded in the owning entity's structure.
    fn is_stored_in_entity_structure(&self, metadata: &AssociationKeyMetadata) -> bool;

    /// Creates the given sequences if they do not exist yet.
    ///
    /// Called once at schema initialisation. Table generators need no
    /// definition.
    fn define_sequences(&self, sequences: &[SequenceDefinition]) -> GridResult<()>;

    /// Returns the next value of a generator.
    ///
    /// Fails with `InvalidOperation` for a sequence that was never defined.
    fn next_value(
        &self,
        request: &NextValueRequest,
        ctx: &mut TransactionContext,
    ) -> GridResult<i64>;

    /// Feeds every tuple of the table described by `metadata` to `consumer`.
    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        metadata: &EntityKeyMetadata,
    ) -> GridResult<()>;

    /// Duplicate-insert detection used for this entity kind.
    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy;

    /// Batch facet.
    fn batchable(&self) -> Option<&dyn BatchableGridDialect> {
        None
    }

    /// Optimistic locking facet.
    fn optimistic_locking(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        None
    }

    /// Native query facet.
    fn queryable(&self) -> Option<&dyn QueryableGridDialect> {
        None
    }

    /// Stored procedure facet.
    fn stored_procedures(&self) -> Option<&dyn StoredProcedureAwareGridDialect> {
        None
    }

    /// Multi-key read facet.
    fn multiget(&self) -> Option<&dyn MultigetGridDialect> {
        None
    }
}

/// Applies queued writes in one round trip.
pub trait BatchableGridDialect: Send + Sync {
    /// Applies `operations` in order.
    fn execute_batch(
        &self,
        operations: Vec<GridDialectOperation>,
        ctx: &mut TransactionContext,
    ) -> GridResult<()>;
}

/// Versioned writes.
pub trait OptimisticLockingAwareGridDialect: Send + Sync {
    /// Writes `tuple` only if every column of `old_lock_state` still matches.
    ///
    /// Returns `false`, leaving the store untouched, when it does not.
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &mut TuplePointer,
        ctx: &mut TransactionContext,
    ) -> GridResult<bool>;

    /// Removes the tuple only if every column of `old_lock_state` still
    /// matches.
    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        ctx: &mut TransactionContext,
    ) -> GridResult<bool>;
}

/// Native query execution.
pub trait QueryableGridDialect: Send + Sync {
    /// Runs a translated query and returns the selected window of rows.
    fn execute_backend_query(
        &self,
        query: &BackendQuery,
        params: &QueryParameters,
        selection: &RowSelection,
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Tuple>>;
}

/// Stored procedure calls.
pub trait StoredProcedureAwareGridDialect: Send + Sync {
    /// Calls procedure `name` and returns its result rows.
    fn call_stored_procedure(
        &self,
        name: &str,
        params: &ProcedureParameters,
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Tuple>>;
}

/// Reads of several keys in one round trip.
pub trait MultigetGridDialect: Send + Sync {
    /// Returns one entry per key, in key order; `None` for missing keys.
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Option<Tuple>>>;
}

/// Optional dialect capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectFacet {
    /// [`BatchableGridDialect`]
    Batchable,
    /// [`OptimisticLockingAwareGridDialect`]
    OptimisticLocking,
    /// [`QueryableGridDialect`]
    Queryable,
    /// [`StoredProcedureAwareGridDialect`]
    StoredProcedures,
    /// [`MultigetGridDialect`]
    Multiget,
}

/// Capability queries over dialects.
pub struct GridDialects;

impl GridDialects {
    /// Whether `dialect` offers `facet`.
    pub fn has_facet(dialect: &dyn GridDialect, facet: DialectFacet) -> bool {
        match facet {
            DialectFacet::Batchable => dialect.batchable().is_some(),
            DialectFacet::OptimisticLocking => dialect.optimistic_locking().is_some(),
            DialectFacet::Queryable => dialect.queryable().is_some(),
            DialectFacet::StoredProcedures => dialect.stored_procedures().is_some(),
            DialectFacet::Multiget => dialect.multiget().is_some(),
        }
    }

    /// Every facet `dialect` offers.
    pub fn facets(dialect: &dyn GridDialect) -> Vec<DialectFacet> {
        [
            DialectFacet::Batchable,
            DialectFacet::OptimisticLocking,
            DialectFacet::Queryable,
            DialectFacet::StoredProcedures,
            DialectFacet::Multiget,
        ]
        .into_iter()
        .filter(|facet| Self::has_facet(dialect, *facet))
        .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tuplegrid_model::{SnapshotType, Value};

    /// Minimal batchable dialect over a locked map.
    #[derive(Default)]
    pub(crate) struct RecordingDialect {
        pub(crate) rows: Mutex<HashMap<EntityKey, Tuple>>,
        pub(crate) batches: Mutex<Vec<usize>>,
        pub(crate) batchable: bool,
        pub(crate) fail_reads: bool,
    }

    impl RecordingDialect {
        pub(crate) fn batching() -> Self {
            Self {
                batchable: true,
                ..Self::default()
            }
        }

        fn apply(&self, operation: GridDialectOperation) {
            match operation {
                GridDialectOperation::InsertOrUpdateTuple { key, tuple } => {
                    self.rows.lock().insert(key, tuple.into_applied());
                }
                GridDialectOperation::RemoveTuple { key } => {
                    self.rows.lock().remove(&key);
                }
                _ => {}
            }
        }
    }

    impl GridDialect for RecordingDialect {
        fn get_tuple(
            &self,
            key: &EntityKey,
            _ctx: &mut TransactionContext,
        ) -> GridResult<Option<Tuple>> {
            if self.fail_reads {
                return Err(crate::GridError::backend("connection reset"));
            }
            Ok(self.rows.lock().get(key).cloned())
        }

        fn create_tuple(&self, _key: &EntityKey, _ctx: &mut TransactionContext) -> GridResult<Tuple> {
            let mut tuple = Tuple::new();
            tuple.set_snapshot_type(SnapshotType::Insert);
            Ok(tuple)
        }

        fn insert_or_update_tuple(
            &self,
            key: &EntityKey,
            tuple: &mut TuplePointer,
            _ctx: &mut TransactionContext,
        ) -> GridResult<()> {
            self.apply(GridDialectOperation::InsertOrUpdateTuple {
                key: key.clone(),
                tuple: tuple.tuple().clone(),
            });
            Ok(())
        }

        fn remove_tuple(&self, key: &EntityKey, _ctx: &mut TransactionContext) -> GridResult<()> {
            self.apply(GridDialectOperation::RemoveTuple { key: key.clone() });
            Ok(())
        }

        fn get_association(
            &self,
            _key: &AssociationKey,
            _ctx: &mut TransactionContext,
        ) -> GridResult<Option<Association>> {
            Ok(None)
        }

        fn create_association(
            &self,
            _key: &AssociationKey,
            _ctx: &mut TransactionContext,
        ) -> GridResult<Association> {
            Ok(Association::new())
        }

        fn insert_or_update_association(
            &self,
            _key: &AssociationKey,
            _association: &mut Association,
            _ctx: &mut TransactionContext,
        ) -> GridResult<()> {
            Ok(())
        }

        fn remove_association(
            &self,
            _key: &AssociationKey,
            _ctx: &mut TransactionContext,
        ) -> GridResult<()> {
            Ok(())
        }

        fn is_stored_in_entity_structure(&self, _metadata: &AssociationKeyMetadata) -> bool {
            false
        }

        fn define_sequences(&self, _sequences: &[SequenceDefinition]) -> GridResult<()> {
            Ok(())
        }

        fn next_value(
            &self,
            request: &NextValueRequest,
            _ctx: &mut TransactionContext,
        ) -> GridResult<i64> {
            Ok(request.initial_value)
        }

        fn for_each_tuple(
            &self,
            consumer: &mut dyn ModelConsumer,
            metadata: &EntityKeyMetadata,
        ) -> GridResult<()> {
            let rows: Vec<Tuple> = self
                .rows
                .lock()
                .iter()
                .filter(|(key, _)| key.table() == metadata.table())
                .map(|(_, tuple)| tuple.clone())
                .collect();
            for tuple in rows {
                consumer.consume(tuple)?;
            }
            Ok(())
        }

        fn duplicate_insert_prevention_strategy(
            &self,
            _metadata: &EntityKeyMetadata,
        ) -> DuplicateInsertPreventionStrategy {
            DuplicateInsertPreventionStrategy::Native
        }

        fn batchable(&self) -> Option<&dyn BatchableGridDialect> {
            self.batchable.then_some(self as &dyn BatchableGridDialect)
        }
    }

    impl BatchableGridDialect for RecordingDialect {
        fn execute_batch(
            &self,
            operations: Vec<GridDialectOperation>,
            _ctx: &mut TransactionContext,
        ) -> GridResult<()> {
            self.batches.lock().push(operations.len());
            for operation in operations {
                self.apply(operation);
            }
            Ok(())
        }
    }

    pub(crate) fn shipment(id: i64) -> EntityKey {
        EntityKey::new(
            EntityKeyMetadata::new("Shipment", ["id"]),
            vec![Value::Integer(id)],
        )
    }

    #[test]
    fn facets_are_reported() {
        let plain = RecordingDialect::default();
        assert!(GridDialects::facets(&plain).is_empty());

        let batching = RecordingDialect::batching();
        assert!(GridDialects::has_facet(&batching, DialectFacet::Batchable));
        assert!(!GridDialects::has_facet(&batching, DialectFacet::Queryable));
    }
}
