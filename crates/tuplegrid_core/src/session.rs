//! Units of work over a dialect.
//!
//! A [`Grid`] wraps a datastore dialect in the standard stack: writes are
//! deferred through a [`BatchOperationsDelegator`] when the dialect can batch,
//! and every applied operation is recorded by an
//! [`InvocationCollectingGridDialect`]. A [`Session`] collects work units and
//! drives them through the stack on flush.

use crate::config::GridConfig;
use crate::context::TransactionContext;
use crate::dialect::{
    BatchOperationsDelegator, DuplicateInsertPreventionStrategy, GridDialect,
    GridDialectOperation, InvocationCollectingGridDialect,
};
use crate::error::{GridError, GridResult};
use crate::failure::{ErrorHandler, FailedOperationContext, RollbackContext};
use crate::id::{NextValueRequest, SequenceDefinition};
use crate::procedures::ProcedureParameters;
use crate::query::{BackendQuery, RowSelection};
use crate::scan::{CancellationToken, ParallelTupleScan};
use crate::types::{TransactionId, TransactionIds};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use tuplegrid_model::{
    Association, AssociationKey, EntityKey, EntityKeyMetadata, Tuple, TupleOperation,
    TuplePointer, Value,
};
use tuplegrid_query::QueryParameters;

/// Entry point: a dialect stack plus configuration.
pub struct Grid {
    dialect: Arc<dyn GridDialect>,
    config: GridConfig,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    transaction_ids: TransactionIds,
}

impl Grid {
    /// Builds the dialect stack over `dialect`.
    pub fn new(dialect: Arc<dyn GridDialect>, config: GridConfig) -> Self {
        let stacked: Arc<dyn GridDialect> =
            match BatchOperationsDelegator::new(Arc::clone(&dialect)) {
                Ok(batching) => Arc::new(batching),
                Err(_) => dialect,
            };
        Self {
            dialect: Arc::new(InvocationCollectingGridDialect::new(stacked)),
            config,
            error_handler: None,
            transaction_ids: TransactionIds::new(),
        }
    }

    /// Registers the handler notified about failures and rollbacks.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// The top of the dialect stack.
    pub fn dialect(&self) -> &dyn GridDialect {
        self.dialect.as_ref()
    }

    /// The configuration.
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Creates the schema's sequences in the datastore.
    ///
    /// Run once before the first unit of work. Sequences that already exist
    /// keep their current value.
    pub fn initialize_schema(&self, sequences: &[SequenceDefinition]) -> GridResult<()> {
        debug!(
            target: "tuplegrid::session",
            sequences = sequences.len(),
            "initializing schema"
        );
        self.dialect.define_sequences(sequences)
    }

    /// Starts a unit of work.
    ///
    /// Dropping the session without flushing discards its pending work.
    pub fn begin(&self) -> Session<'_> {
        let id = self.transaction_ids.allocate();
        let mut ctx = TransactionContext::new(id);
        if let Some(handler) = &self.error_handler {
            ctx = ctx.with_error_handler(Arc::clone(handler));
        }
        trace!(target: "tuplegrid::session", transaction = %id, "session started");
        Session {
            grid: self,
            ctx,
            pending: Vec::new(),
        }
    }

    /// Executes a function within a unit of work.
    ///
    /// The session is flushed if the function returns `Ok`. If the function
    /// or the flush fails, the error handler receives the operations applied
    /// so far and the error is returned.
    ///
    /// # Example
    ///
    /// ```ignore
    /// grid.transaction(|session| {
    ///     session.insert(key, tuple);
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> GridResult<T>
    where
        F: FnOnce(&mut Session<'_>) -> GridResult<T>,
    {
        let mut session = self.begin();
        match f(&mut session).and_then(|value| session.flush().map(|()| value)) {
            Ok(value) => {
                session.commit();
                Ok(value)
            }
            Err(error) => {
                session.rollback(&error);
                Err(error)
            }
        }
    }

    /// Runs `worker` over every tuple of `tables` with the configured mass
    /// scan settings.
    pub fn scan<W>(
        &self,
        tables: &[EntityKeyMetadata],
        worker: W,
        cancel: &CancellationToken,
    ) -> GridResult<u64>
    where
        W: Fn(Tuple) -> GridResult<()> + Sync,
    {
        ParallelTupleScan::new(self.config.mass_scan.clone()).run(
            self.dialect.as_ref(),
            tables,
            worker,
            cancel,
        )
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("config", &self.config)
            .field("error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// A deferred write.
#[derive(Debug, Clone)]
enum WorkUnit {
    Insert {
        key: EntityKey,
        tuple: Tuple,
    },
    Update {
        key: EntityKey,
        tuple: Tuple,
    },
    UpdateVersioned {
        key: EntityKey,
        old_lock_state: Tuple,
        tuple: Tuple,
    },
    Remove {
        key: EntityKey,
    },
    RemoveVersioned {
        key: EntityKey,
        old_lock_state: Tuple,
    },
    SaveAssociation {
        key: AssociationKey,
        association: Association,
    },
    RemoveAssociation {
        key: AssociationKey,
    },
}

/// One unit of work.
///
/// Reads go to the dialect immediately. Writes are collected and applied in
/// order by [`Session::flush`]; they become visible to reads once flushed.
pub struct Session<'g> {
    grid: &'g Grid,
    ctx: TransactionContext,
    pending: Vec<WorkUnit>,
}

impl<'g> Session<'g> {
    /// Transaction ID of this session.
    pub fn id(&self) -> TransactionId {
        self.ctx.id()
    }

    /// The transaction context, including the operation log.
    pub fn context(&self) -> &TransactionContext {
        &self.ctx
    }

    /// Number of writes waiting for flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Schedules the insert of a new entity with the columns set on `tuple`.
    pub fn insert(&mut self, key: EntityKey, tuple: Tuple) {
        self.pending.push(WorkUnit::Insert { key, tuple });
    }

    /// Schedules an update of an existing entity.
    pub fn update(&mut self, key: EntityKey, tuple: Tuple) {
        self.pending.push(WorkUnit::Update { key, tuple });
    }

    /// Schedules a versioned update; `old_lock_state` holds the version
    /// columns as read.
    pub fn update_versioned(&mut self, key: EntityKey, old_lock_state: Tuple, tuple: Tuple) {
        self.pending.push(WorkUnit::UpdateVersioned {
            key,
            old_lock_state,
            tuple,
        });
    }

    /// Schedules the removal of an entity.
    pub fn remove(&mut self, key: EntityKey) {
        self.pending.push(WorkUnit::Remove { key });
    }

    /// Schedules a versioned removal.
    pub fn remove_versioned(&mut self, key: EntityKey, old_lock_state: Tuple) {
        self.pending.push(WorkUnit::RemoveVersioned {
            key,
            old_lock_state,
        });
    }

    /// Schedules the write of an association's changes.
    pub fn save_association(&mut self, key: AssociationKey, association: Association) {
        self.pending
            .push(WorkUnit::SaveAssociation { key, association });
    }

    /// Schedules the removal of an association.
    pub fn remove_association(&mut self, key: AssociationKey) {
        self.pending.push(WorkUnit::RemoveAssociation { key });
    }

    /// Reads one entity.
    pub fn get(&mut self, key: &EntityKey) -> GridResult<Option<Tuple>> {
        self.grid.dialect.get_tuple(key, &mut self.ctx)
    }

    /// Reads several entities, in one round trip when the dialect allows it.
    pub fn get_many(&mut self, keys: &[EntityKey]) -> GridResult<Vec<Option<Tuple>>> {
        let grid = self.grid;
        let dialect = grid.dialect.as_ref();
        match dialect.multiget() {
            Some(multiget) => multiget.get_tuples(keys, &mut self.ctx),
            None => keys
                .iter()
                .map(|key| dialect.get_tuple(key, &mut self.ctx))
                .collect(),
        }
    }

    /// Reads an association.
    pub fn get_association(&mut self, key: &AssociationKey) -> GridResult<Option<Association>> {
        self.grid.dialect.get_association(key, &mut self.ctx)
    }

    /// Reads an association, or creates an empty one if it does not exist.
    pub fn get_or_create_association(&mut self, key: &AssociationKey) -> GridResult<Association> {
        match self.get_association(key)? {
            Some(association) => Ok(association),
            None => self.grid.dialect.create_association(key, &mut self.ctx),
        }
    }

    /// Returns the next value of a generator.
    pub fn next_value(&mut self, request: &NextValueRequest) -> GridResult<i64> {
        self.grid.dialect.next_value(request, &mut self.ctx)
    }

    /// Flushes pending writes and runs a native query.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` if the dialect cannot run queries.
    pub fn query(
        &mut self,
        query: &BackendQuery,
        params: &QueryParameters,
        selection: &RowSelection,
    ) -> GridResult<Vec<Tuple>> {
        self.flush()?;
        let grid = self.grid;
        let queryable = grid
            .dialect
            .queryable()
            .ok_or_else(|| GridError::unsupported("execute_backend_query"))?;
        let mut selection = *selection;
        if selection.fetch_size.is_none() {
            selection.fetch_size = Some(grid.config.default_fetch_size);
        }
        debug!(
            target: "tuplegrid::session",
            transaction = %self.ctx.id(),
            language = query.language(),
            table = query.table(),
            "executing query"
        );
        queryable.execute_backend_query(query, params, &selection, &mut self.ctx)
    }

    /// Calls a stored procedure.
    pub fn call_procedure(
        &mut self,
        name: &str,
        params: &ProcedureParameters,
    ) -> GridResult<Vec<Tuple>> {
        let grid = self.grid;
        grid.dialect
            .stored_procedures()
            .ok_or_else(|| GridError::unsupported("call_stored_procedure"))?
            .call_stored_procedure(name, params, &mut self.ctx)
    }

    /// Applies every pending write, in order.
    ///
    /// Writes are batched when the dialect allows it; a batch round trip
    /// happens whenever the configured batch size is reached, before every
    /// versioned write, and at the end.
    ///
    /// Removing an association the dialect stores inside its owner is
    /// skipped when the same flush removes the owner.
    pub fn flush(&mut self) -> GridResult<()> {
        let units = std::mem::take(&mut self.pending);
        if units.is_empty() && self.ctx.queue.is_empty() {
            return Ok(());
        }
        debug!(
            target: "tuplegrid::session",
            transaction = %self.ctx.id(),
            units = units.len(),
            "flushing"
        );
        let removed_owners: HashSet<EntityKey> = units
            .iter()
            .filter_map(|unit| match unit {
                WorkUnit::Remove { key } | WorkUnit::RemoveVersioned { key, .. } => {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();
        for unit in units {
            if self.removed_with_owner(&unit, &removed_owners) {
                continue;
            }
            self.apply(unit)?;
            if self.ctx.queue.len() >= self.grid.config.batch_size {
                self.execute_batch()?;
            }
        }
        self.execute_batch()
    }

    fn removed_with_owner(&self, unit: &WorkUnit, removed_owners: &HashSet<EntityKey>) -> bool {
        let WorkUnit::RemoveAssociation { key } = unit else {
            return false;
        };
        let embedded = self.grid.dialect.is_stored_in_entity_structure(key.metadata())
            && removed_owners.contains(key.entity_key());
        if embedded {
            trace!(
                target: "tuplegrid::session",
                transaction = %self.ctx.id(),
                association = key.table(),
                "association goes with its owner"
            );
        }
        embedded
    }

    fn apply(&mut self, unit: WorkUnit) -> GridResult<()> {
        let grid = self.grid;
        let dialect = grid.dialect.as_ref();
        match unit {
            WorkUnit::Insert { key, tuple } => self.insert_tuple(&key, &tuple),
            WorkUnit::Update { key, tuple } => {
                dialect.insert_or_update_tuple(&key, &mut TuplePointer::new(tuple), &mut self.ctx)
            }
            WorkUnit::Remove { key } => dialect.remove_tuple(&key, &mut self.ctx),
            WorkUnit::UpdateVersioned {
                key,
                old_lock_state,
                tuple,
            } => {
                self.execute_batch()?;
                let locking = dialect
                    .optimistic_locking()
                    .ok_or_else(|| GridError::unsupported("update_tuple_with_optimistic_lock"))?;
                let mut pointer = TuplePointer::new(tuple);
                if locking.update_tuple_with_optimistic_lock(
                    &key,
                    &old_lock_state,
                    &mut pointer,
                    &mut self.ctx,
                )? {
                    Ok(())
                } else {
                    Err(GridError::optimistic_lock_failure(&key))
                }
            }
            WorkUnit::RemoveVersioned {
                key,
                old_lock_state,
            } => {
                self.execute_batch()?;
                let locking = dialect
                    .optimistic_locking()
                    .ok_or_else(|| GridError::unsupported("remove_tuple_with_optimistic_lock"))?;
                if locking.remove_tuple_with_optimistic_lock(&key, &old_lock_state, &mut self.ctx)? {
                    Ok(())
                } else {
                    Err(GridError::optimistic_lock_failure(&key))
                }
            }
            WorkUnit::SaveAssociation {
                key,
                mut association,
            } => dialect.insert_or_update_association(&key, &mut association, &mut self.ctx),
            WorkUnit::RemoveAssociation { key } => dialect.remove_association(&key, &mut self.ctx),
        }
    }

    fn insert_tuple(&mut self, key: &EntityKey, values: &Tuple) -> GridResult<()> {
        let grid = self.grid;
        let dialect = grid.dialect.as_ref();
        let strategy = grid
            .config
            .duplicate_insert_prevention
            .unwrap_or_else(|| dialect.duplicate_insert_prevention_strategy(key.metadata()));

        if strategy == DuplicateInsertPreventionStrategy::LookUp {
            let mark = self.ctx.log.len();
            if dialect.get_tuple(key, &mut self.ctx)?.is_some() {
                self.ctx.log.rewind(mark);
                let error = GridError::entity_already_exists(key);
                self.report_failure(GridDialectOperation::GetTuple { key: key.clone() }, &error);
                return Err(error);
            }
        }

        let mut tuple = dialect.create_tuple(key, &mut self.ctx)?;
        for operation in values.operations() {
            match operation {
                TupleOperation::Put { column, value } => tuple.put(column, value),
                TupleOperation::PutNull { column } => tuple.put(column, Value::Null),
                TupleOperation::Remove { column } => tuple.remove(column),
            }
        }
        dialect.insert_or_update_tuple(key, &mut TuplePointer::new(tuple), &mut self.ctx)
    }

    fn execute_batch(&mut self) -> GridResult<()> {
        if self.ctx.queue.is_empty() {
            return Ok(());
        }
        let grid = self.grid;
        let batch = grid
            .dialect
            .batchable()
            .ok_or_else(|| GridError::unsupported("execute_batch"))?;
        let operations = self.ctx.queue.drain();
        debug!(
            target: "tuplegrid::session",
            transaction = %self.ctx.id(),
            operations = operations.len(),
            "executing batch"
        );
        batch.execute_batch(operations, &mut self.ctx)
    }

    fn report_failure(&self, operation: GridDialectOperation, error: &GridError) {
        if let Some(handler) = self.ctx.error_handler() {
            let context = FailedOperationContext {
                transaction: self.ctx.id(),
                failed_operation: operation,
                applied_operations: self.ctx.log.operations().to_vec(),
                error: error.to_string(),
            };
            let requested = handler.on_failed_operation(&context);
            trace!(
                target: "tuplegrid::session",
                transaction = %self.ctx.id(),
                ?requested,
                "duplicate key aborts regardless of strategy"
            );
        }
    }

    fn commit(&mut self) {
        debug!(
            target: "tuplegrid::session",
            transaction = %self.ctx.id(),
            applied = self.ctx.log.len(),
            "committed"
        );
        self.ctx.log.clear();
    }

    fn rollback(&mut self, error: &GridError) {
        self.pending.clear();
        self.ctx.queue.drain();
        debug!(
            target: "tuplegrid::session",
            transaction = %self.ctx.id(),
            applied = self.ctx.log.len(),
            error = %error,
            "rolling back"
        );
        if let Some(handler) = self.ctx.error_handler() {
            handler.on_rollback(&RollbackContext {
                transaction: self.ctx.id(),
                applied_operations: self.ctx.log.operations().to_vec(),
                error: error.to_string(),
            });
        }
        self.ctx.log.clear();
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ctx", &self.ctx)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::tests::{shipment, RecordingDialect};
    use crate::dialect::OperationKind;
    use parking_lot::Mutex;
    use tuplegrid_model::Value;

    #[derive(Default)]
    struct CapturingHandler {
        rollbacks: Mutex<Vec<Vec<OperationKind>>>,
        failures: Mutex<Vec<OperationKind>>,
    }

    impl ErrorHandler for CapturingHandler {
        fn on_rollback(&self, context: &RollbackContext) {
            self.rollbacks
                .lock()
                .push(context.applied_operations.iter().map(|op| op.kind()).collect());
        }

        fn on_failed_operation(
            &self,
            context: &FailedOperationContext,
        ) -> crate::failure::ErrorHandlingStrategy {
            self.failures.lock().push(context.failed_operation.kind());
            crate::failure::ErrorHandlingStrategy::Abort
        }
    }

    fn state(value: &str) -> Tuple {
        let mut tuple = Tuple::new();
        tuple.put("state", value);
        tuple
    }

    #[test]
    fn transaction_flushes_on_success() {
        let backend = Arc::new(RecordingDialect::default());
        let grid = Grid::new(backend.clone(), GridConfig::default());

        grid.transaction(|session| {
            session.insert(shipment(1), state("INITIAL"));
            assert_eq!(session.pending(), 1);
            Ok(())
        })
        .unwrap();

        let stored = backend.rows.lock().get(&shipment(1)).cloned().unwrap();
        assert_eq!(stored.get("state"), Some(Value::from("INITIAL")));
    }

    #[test]
    fn closure_error_rolls_back_without_writing() {
        let backend = Arc::new(RecordingDialect::default());
        let handler = Arc::new(CapturingHandler::default());
        let grid =
            Grid::new(backend.clone(), GridConfig::default()).with_error_handler(handler.clone());

        let result: GridResult<()> = grid.transaction(|session| {
            session.insert(shipment(1), state("INITIAL"));
            Err(GridError::invalid_operation("host gave up"))
        });

        assert!(result.is_err());
        assert!(backend.rows.lock().is_empty());
        assert_eq!(handler.rollbacks.lock().len(), 1);
    }

    #[test]
    fn look_up_rejects_duplicates() {
        let backend = Arc::new(RecordingDialect::default());
        let handler = Arc::new(CapturingHandler::default());
        let config =
            GridConfig::new().duplicate_insert_prevention(DuplicateInsertPreventionStrategy::LookUp);
        let grid = Grid::new(backend, config).with_error_handler(handler.clone());

        let err = grid
            .transaction(|session| {
                session.insert(shipment(1), state("INITIAL"));
                session.insert(shipment(1), state("DUPLICATE"));
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, GridError::EntityAlreadyExists { .. }));
        assert_eq!(*handler.failures.lock(), vec![OperationKind::GetTuple]);
        assert_eq!(
            handler.rollbacks.lock()[0],
            vec![
                OperationKind::GetTuple,
                OperationKind::CreateTupleWithKey,
                OperationKind::InsertOrUpdateTuple,
            ]
        );
    }

    #[test]
    fn batched_writes_are_flushed_at_batch_size() {
        let backend = Arc::new(RecordingDialect::batching());
        let grid = Grid::new(backend.clone(), GridConfig::new().batch_size(2));

        grid.transaction(|session| {
            for id in 1..=5 {
                session.insert(shipment(id), state("INITIAL"));
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(*backend.batches.lock(), vec![2, 2, 1]);
        assert_eq!(backend.rows.lock().len(), 5);
    }

    #[test]
    fn versioned_write_needs_the_facet() {
        let grid = Grid::new(Arc::new(RecordingDialect::default()), GridConfig::default());
        let err = grid
            .transaction(|session| {
                session.update_versioned(shipment(1), Tuple::new(), state("PROCESSING"));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, GridError::UnsupportedOperation { .. }));
    }

    #[test]
    fn get_many_falls_back_to_single_reads() {
        let backend = Arc::new(RecordingDialect::default());
        let grid = Grid::new(backend, GridConfig::default());
        grid.transaction(|session| {
            session.insert(shipment(1), state("INITIAL"));
            Ok(())
        })
        .unwrap();

        let mut session = grid.begin();
        let rows = session.get_many(&[shipment(1), shipment(2)]).unwrap();
        assert!(rows[0].is_some());
        assert!(rows[1].is_none());
        assert_eq!(
            session.context().log.kinds(),
            vec![OperationKind::GetTuple, OperationKind::GetTuple]
        );
    }

    #[test]
    fn transaction_ids_increase() {
        let grid = Grid::new(Arc::new(RecordingDialect::default()), GridConfig::default());
        let first = grid.begin().id();
        let second = grid.begin().id();
        assert!(first < second);
    }
}
