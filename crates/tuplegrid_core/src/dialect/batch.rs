use super::{
    BatchableGridDialect, DuplicateInsertPreventionStrategy, ForwardingGridDialect, GridDialect,
    GridDialectOperation, MultigetGridDialect, OptimisticLockingAwareGridDialect,
    QueryableGridDialect, StoredProcedureAwareGridDialect,
};
use crate::context::TransactionContext;
use crate::error::{GridError, GridResult};
use crate::id::{NextValueRequest, SequenceDefinition};
use crate::scan::ModelConsumer;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use tuplegrid_model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
    TuplePointer,
};

/// Defers writes to a batchable dialect until the next batch round trip.
///
/// Tuple and association writes go to the context's [`OperationsQueue`];
/// reads consult the queue before the store so a unit of work sees its own
/// writes. Tuple creation is not deferred.
///
/// [`OperationsQueue`]: super::OperationsQueue
pub struct BatchOperationsDelegator {
    inner: ForwardingGridDialect,
}

impl BatchOperationsDelegator {
    /// Wraps a batchable dialect.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` if `delegate` cannot execute batches.
    pub fn new(delegate: Arc<dyn GridDialect>) -> GridResult<Self> {
        if delegate.batchable().is_none() {
            return Err(GridError::unsupported("execute_batch"));
        }
        Ok(Self {
            inner: ForwardingGridDialect::new(delegate),
        })
    }

    fn enqueue(&self, operation: GridDialectOperation, ctx: &mut TransactionContext) {
        trace!(
            target: "tuplegrid::dialect",
            transaction = %ctx.id(),
            operation = %operation.kind(),
            queued = ctx.queue.len() + 1,
            "write queued for batch"
        );
        ctx.queue.push(operation);
    }
}

impl fmt::Debug for BatchOperationsDelegator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOperationsDelegator").finish_non_exhaustive()
    }
}

impl GridDialect for BatchOperationsDelegator {
    fn get_tuple(
        &self,
        key: &EntityKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Tuple>> {
        match ctx.queue.pending_tuple(key) {
            Some(pending) => Ok(pending.map(|tuple| tuple.clone().into_applied())),
            None => self.inner.get_tuple(key, ctx),
        }
    }

    fn create_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<Tuple> {
        self.inner.create_tuple(key, ctx)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &mut TuplePointer,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.enqueue(
            GridDialectOperation::InsertOrUpdateTuple {
                key: key.clone(),
                tuple: tuple.tuple().clone(),
            },
            ctx,
        );
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<()> {
        self.enqueue(GridDialectOperation::RemoveTuple { key: key.clone() }, ctx);
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Association>> {
        match ctx.queue.pending_association(key) {
            Some(pending) => Ok(pending.map(|association| association.clone().into_applied())),
            None => self.inner.get_association(key, ctx),
        }
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Association> {
        self.inner.create_association(key, ctx)
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &mut Association,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.enqueue(
            GridDialectOperation::InsertOrUpdateAssociation {
                key: key.clone(),
                association: association.clone(),
            },
            ctx,
        );
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.enqueue(
            GridDialectOperation::RemoveAssociation { key: key.clone() },
            ctx,
        );
        Ok(())
    }

    fn is_stored_in_entity_structure(&self, metadata: &AssociationKeyMetadata) -> bool {
        self.inner.is_stored_in_entity_structure(metadata)
    }

    fn define_sequences(&self, sequences: &[SequenceDefinition]) -> GridResult<()> {
        self.inner.define_sequences(sequences)
    }

    fn next_value(
        &self,
        request: &NextValueRequest,
        ctx: &mut TransactionContext,
    ) -> GridResult<i64> {
        self.inner.next_value(request, ctx)
    }

    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        metadata: &EntityKeyMetadata,
    ) -> GridResult<()> {
        self.inner.for_each_tuple(consumer, metadata)
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        self.inner.duplicate_insert_prevention_strategy(metadata)
    }

    fn batchable(&self) -> Option<&dyn BatchableGridDialect> {
        Some(self)
    }

    fn optimistic_locking(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        self.inner.optimistic_locking()
    }

    fn queryable(&self) -> Option<&dyn QueryableGridDialect> {
        self.inner.queryable()
    }

    fn stored_procedures(&self) -> Option<&dyn StoredProcedureAwareGridDialect> {
        self.inner.stored_procedures()
    }

    fn multiget(&self) -> Option<&dyn MultigetGridDialect> {
        self.inner.multiget()
    }
}

impl BatchableGridDialect for BatchOperationsDelegator {
    fn execute_batch(
        &self,
        operations: Vec<GridDialectOperation>,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.inner
            .batchable()
            .ok_or_else(|| GridError::unsupported("execute_batch"))?
            .execute_batch(operations, ctx)
    }
}
