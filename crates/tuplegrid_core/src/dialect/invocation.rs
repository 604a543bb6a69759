use super::{
    BatchableGridDialect, DuplicateInsertPreventionStrategy, GridDialect, GridDialectOperation,
    MultigetGridDialect, OptimisticLockingAwareGridDialect, QueryableGridDialect,
    StoredProcedureAwareGridDialect,
};
use crate::context::TransactionContext;
use crate::error::{GridError, GridResult};
use crate::failure::{ErrorHandlingStrategy, FailedOperationContext};
use crate::id::{NextValueRequest, SequenceDefinition};
use crate::procedures::ProcedureParameters;
use crate::query::{BackendQuery, RowSelection};
use crate::scan::ModelConsumer;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use tuplegrid_model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
    TuplePointer,
};
use tuplegrid_query::QueryParameters;

/// Records every applied operation in the context's [`OperationLog`].
///
/// Over a batchable dialect, individual writes are not recorded; each
/// successful batch round trip is recorded as one `ExecuteBatch`. Versioned
/// writes are recorded only when they were applied. Failures are reported to
/// the context's error handler, which may ask to continue past errors that
/// allow it; the operation then yields a default value.
///
/// [`OperationLog`]: super::OperationLog
pub struct InvocationCollectingGridDialect {
    delegate: Arc<dyn GridDialect>,
    batched: bool,
}

impl InvocationCollectingGridDialect {
    /// Wraps `delegate`.
    pub fn new(delegate: Arc<dyn GridDialect>) -> Self {
        let batched = delegate.batchable().is_some();
        Self { delegate, batched }
    }

    fn invoke<T, F>(
        &self,
        ctx: &mut TransactionContext,
        operation: GridDialectOperation,
        record: bool,
        call: F,
    ) -> GridResult<T>
    where
        T: Default,
        F: FnOnce(&mut TransactionContext) -> GridResult<T>,
    {
        match call(ctx) {
            Ok(value) => {
                debug!(
                    target: "tuplegrid::dialect",
                    transaction = %ctx.id(),
                    operation = %operation.kind(),
                    table = operation.table().unwrap_or("-"),
                    "operation applied"
                );
                if record {
                    ctx.log.record(operation);
                }
                Ok(value)
            }
            Err(error) => Self::on_failure(ctx, operation, error).map(|()| T::default()),
        }
    }

    fn on_failure(
        ctx: &TransactionContext,
        operation: GridDialectOperation,
        error: GridError,
    ) -> GridResult<()> {
        let Some(handler) = ctx.error_handler() else {
            return Err(error);
        };
        let kind = operation.kind();
        let context = FailedOperationContext {
            transaction: ctx.id(),
            failed_operation: operation,
            applied_operations: ctx.log.operations().to_vec(),
            error: error.to_string(),
        };
        match handler.on_failed_operation(&context) {
            ErrorHandlingStrategy::Continue if error.allows_continue() => {
                warn!(
                    target: "tuplegrid::dialect",
                    transaction = %ctx.id(),
                    operation = %kind,
                    error = %error,
                    "continuing past failed operation"
                );
                Ok(())
            }
            _ => Err(error),
        }
    }

    fn facet<'a, T: ?Sized>(facet: Option<&'a T>, operation: &str) -> GridResult<&'a T> {
        facet.ok_or_else(|| GridError::unsupported(operation))
    }
}

impl fmt::Debug for InvocationCollectingGridDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationCollectingGridDialect")
            .field("batched", &self.batched)
            .finish_non_exhaustive()
    }
}

impl GridDialect for InvocationCollectingGridDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Tuple>> {
        let operation = GridDialectOperation::GetTuple { key: key.clone() };
        self.invoke(ctx, operation, true, |ctx| self.delegate.get_tuple(key, ctx))
    }

    fn create_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<Tuple> {
        let operation = GridDialectOperation::CreateTupleWithKey { key: key.clone() };
        self.invoke(ctx, operation, true, |ctx| self.delegate.create_tuple(key, ctx))
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &mut TuplePointer,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        let operation = GridDialectOperation::InsertOrUpdateTuple {
            key: key.clone(),
            tuple: tuple.tuple().clone(),
        };
        self.invoke(ctx, operation, !self.batched, |ctx| {
            self.delegate.insert_or_update_tuple(key, tuple, ctx)
        })
    }

    fn remove_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<()> {
        let operation = GridDialectOperation::RemoveTuple { key: key.clone() };
        self.invoke(ctx, operation, !self.batched, |ctx| {
            self.delegate.remove_tuple(key, ctx)
        })
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Association>> {
        let operation = GridDialectOperation::GetAssociation { key: key.clone() };
        self.invoke(ctx, operation, true, |ctx| {
            self.delegate.get_association(key, ctx)
        })
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Association> {
        let operation = GridDialectOperation::CreateAssociation { key: key.clone() };
        self.invoke(ctx, operation, true, |ctx| {
            self.delegate.create_association(key, ctx)
        })
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &mut Association,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        let operation = GridDialectOperation::InsertOrUpdateAssociation {
            key: key.clone(),
            association: association.clone(),
        };
        self.invoke(ctx, operation, !self.batched, |ctx| {
            self.delegate
                .insert_or_update_association(key, association, ctx)
        })
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        let operation = GridDialectOperation::RemoveAssociation { key: key.clone() };
        self.invoke(ctx, operation, !self.batched, |ctx| {
            self.delegate.remove_association(key, ctx)
        })
    }

    fn is_stored_in_entity_structure(&self, metadata: &AssociationKeyMetadata) -> bool {
        self.delegate.is_stored_in_entity_structure(metadata)
    }

    fn define_sequences(&self, sequences: &[SequenceDefinition]) -> GridResult<()> {
        self.delegate.define_sequences(sequences)
    }

    fn next_value(
        &self,
        request: &NextValueRequest,
        ctx: &mut TransactionContext,
    ) -> GridResult<i64> {
        let operation = GridDialectOperation::NextValue {
            request: request.clone(),
        };
        self.invoke(ctx, operation, true, |ctx| {
            self.delegate.next_value(request, ctx)
        })
    }

    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        metadata: &EntityKeyMetadata,
    ) -> GridResult<()> {
        self.delegate.for_each_tuple(consumer, metadata)
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        self.delegate.duplicate_insert_prevention_strategy(metadata)
    }

    fn batchable(&self) -> Option<&dyn BatchableGridDialect> {
        self.batched.then_some(self as &dyn BatchableGridDialect)
    }

    fn optimistic_locking(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        self.delegate
            .optimistic_locking()
            .map(|_| self as &dyn OptimisticLockingAwareGridDialect)
    }

    fn queryable(&self) -> Option<&dyn QueryableGridDialect> {
        self.delegate
            .queryable()
            .map(|_| self as &dyn QueryableGridDialect)
    }

    fn stored_procedures(&self) -> Option<&dyn StoredProcedureAwareGridDialect> {
        self.delegate
            .stored_procedures()
            .map(|_| self as &dyn StoredProcedureAwareGridDialect)
    }

    fn multiget(&self) -> Option<&dyn MultigetGridDialect> {
        self.delegate
            .multiget()
            .map(|_| self as &dyn MultigetGridDialect)
    }
}

impl BatchableGridDialect for InvocationCollectingGridDialect {
    fn execute_batch(
        &self,
        operations: Vec<GridDialectOperation>,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        let batch = Self::facet(self.delegate.batchable(), "execute_batch")?;
        let operation = GridDialectOperation::ExecuteBatch {
            operations: operations.clone(),
        };
        self.invoke(ctx, operation, true, |ctx| batch.execute_batch(operations, ctx))
    }
}

impl OptimisticLockingAwareGridDialect for InvocationCollectingGridDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &mut TuplePointer,
        ctx: &mut TransactionContext,
    ) -> GridResult<bool> {
        let locking = Self::facet(
            self.delegate.optimistic_locking(),
            "update_tuple_with_optimistic_lock",
        )?;
        let operation = GridDialectOperation::UpdateTupleWithOptimisticLock {
            key: key.clone(),
            old_lock_state: old_lock_state.clone(),
            tuple: tuple.tuple().clone(),
        };
        let applied = self.invoke(ctx, operation.clone(), false, |ctx| {
            locking.update_tuple_with_optimistic_lock(key, old_lock_state, tuple, ctx)
        })?;
        if applied {
            ctx.log.record(operation);
        }
        Ok(applied)
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        ctx: &mut TransactionContext,
    ) -> GridResult<bool> {
        let locking = Self::facet(
            self.delegate.optimistic_locking(),
            "remove_tuple_with_optimistic_lock",
        )?;
        let operation = GridDialectOperation::RemoveTupleWithOptimisticLock {
            key: key.clone(),
            old_lock_state: old_lock_state.clone(),
        };
        let applied = self.invoke(ctx, operation.clone(), false, |ctx| {
            locking.remove_tuple_with_optimistic_lock(key, old_lock_state, ctx)
        })?;
        if applied {
            ctx.log.record(operation);
        }
        Ok(applied)
    }
}

impl QueryableGridDialect for InvocationCollectingGridDialect {
    fn execute_backend_query(
        &self,
        query: &BackendQuery,
        params: &QueryParameters,
        selection: &RowSelection,
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Tuple>> {
        let queryable = Self::facet(self.delegate.queryable(), "execute_backend_query")?;
        let operation = GridDialectOperation::ExecuteBackendQuery {
            table: query.table().to_string(),
            query: query.render(),
        };
        self.invoke(ctx, operation, true, |ctx| {
            queryable.execute_backend_query(query, params, selection, ctx)
        })
    }
}

impl StoredProcedureAwareGridDialect for InvocationCollectingGridDialect {
    fn call_stored_procedure(
        &self,
        name: &str,
        params: &ProcedureParameters,
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Tuple>> {
        let procedures = Self::facet(self.delegate.stored_procedures(), "call_stored_procedure")?;
        let operation = GridDialectOperation::CallStoredProcedure {
            name: name.to_string(),
        };
        self.invoke(ctx, operation, true, |ctx| {
            procedures.call_stored_procedure(name, params, ctx)
        })
    }
}

impl MultigetGridDialect for InvocationCollectingGridDialect {
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Option<Tuple>>> {
        let multiget = Self::facet(self.delegate.multiget(), "get_tuples")?;
        let operation = GridDialectOperation::GetTuples {
            keys: keys.to_vec(),
        };
        self.invoke(ctx, operation, true, |ctx| multiget.get_tuples(keys, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::tests::{shipment, RecordingDialect};
    use crate::dialect::{BatchOperationsDelegator, OperationKind};
    use crate::failure::{ErrorHandler, RollbackContext};
    use crate::types::TransactionId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct ContinueHandler {
        failures: Mutex<Vec<OperationKind>>,
    }

    impl ErrorHandler for ContinueHandler {
        fn on_rollback(&self, _context: &RollbackContext) {}

        fn on_failed_operation(&self, context: &FailedOperationContext) -> ErrorHandlingStrategy {
            self.failures.lock().push(context.failed_operation.kind());
            ErrorHandlingStrategy::Continue
        }
    }

    #[test]
    fn records_applied_operations() {
        let dialect = InvocationCollectingGridDialect::new(Arc::new(RecordingDialect::default()));
        let mut ctx = TransactionContext::new(TransactionId::new(1));

        dialect.get_tuple(&shipment(1), &mut ctx).unwrap();
        let tuple = dialect.create_tuple(&shipment(1), &mut ctx).unwrap();
        dialect
            .insert_or_update_tuple(&shipment(1), &mut TuplePointer::new(tuple), &mut ctx)
            .unwrap();

        assert_eq!(
            ctx.log.kinds(),
            vec![
                OperationKind::GetTuple,
                OperationKind::CreateTupleWithKey,
                OperationKind::InsertOrUpdateTuple,
            ]
        );
    }

    #[test]
    fn batched_writes_are_recorded_as_one_batch() {
        let backend: Arc<dyn GridDialect> = Arc::new(RecordingDialect::batching());
        let delegator = BatchOperationsDelegator::new(backend).unwrap();
        let dialect = InvocationCollectingGridDialect::new(Arc::new(delegator));
        let mut ctx = TransactionContext::new(TransactionId::new(1));

        for id in 1..=2 {
            let tuple = dialect.create_tuple(&shipment(id), &mut ctx).unwrap();
            dialect
                .insert_or_update_tuple(&shipment(id), &mut TuplePointer::new(tuple), &mut ctx)
                .unwrap();
        }
        let operations = ctx.queue.drain();
        dialect
            .batchable()
            .unwrap()
            .execute_batch(operations, &mut ctx)
            .unwrap();

        assert_eq!(
            ctx.log.kinds(),
            vec![
                OperationKind::CreateTupleWithKey,
                OperationKind::CreateTupleWithKey,
                OperationKind::ExecuteBatch,
            ]
        );
    }

    #[test]
    fn continue_is_honoured_for_backend_errors() {
        let backend = RecordingDialect {
            fail_reads: true,
            ..RecordingDialect::default()
        };
        let dialect = InvocationCollectingGridDialect::new(Arc::new(backend));
        let handler = Arc::new(ContinueHandler::default());
        let mut ctx =
            TransactionContext::new(TransactionId::new(1)).with_error_handler(handler.clone());

        let read = dialect.get_tuple(&shipment(1), &mut ctx).unwrap();
        assert!(read.is_none());
        assert!(ctx.log.is_empty());
        assert_eq!(*handler.failures.lock(), vec![OperationKind::GetTuple]);
    }

    #[test]
    fn errors_propagate_without_handler() {
        let backend = RecordingDialect {
            fail_reads: true,
            ..RecordingDialect::default()
        };
        let dialect = InvocationCollectingGridDialect::new(Arc::new(backend));
        let mut ctx = TransactionContext::new(TransactionId::new(1));

        let err = dialect.get_tuple(&shipment(1), &mut ctx).unwrap_err();
        assert!(matches!(err, GridError::Backend { .. }));
    }

    #[test]
    fn missing_facets_stay_missing() {
        let dialect = InvocationCollectingGridDialect::new(Arc::new(RecordingDialect::default()));
        assert!(dialect.batchable().is_none());
        assert!(dialect.optimistic_locking().is_none());
        assert!(dialect.queryable().is_none());
    }
}
