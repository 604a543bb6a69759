use super::{
    BatchableGridDialect, DuplicateInsertPreventionStrategy, GridDialect, MultigetGridDialect,
    OptimisticLockingAwareGridDialect, QueryableGridDialect, StoredProcedureAwareGridDialect,
};
use crate::context::TransactionContext;
use crate::error::GridResult;
use crate::id::{NextValueRequest, SequenceDefinition};
use crate::scan::ModelConsumer;
use std::fmt;
use std::sync::Arc;
use tuplegrid_model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
    TuplePointer,
};

/// Delegates every call, facets included, to a wrapped dialect.
///
/// Wrappers that only change a few operations hold one of these and override
/// the rest by delegation.
#[derive(Clone)]
pub struct ForwardingGridDialect {
    delegate: Arc<dyn GridDialect>,
}

impl ForwardingGridDialect {
    /// Wraps `delegate`.
    pub fn new(delegate: Arc<dyn GridDialect>) -> Self {
        Self { delegate }
    }

    /// Returns the wrapped dialect.
    pub fn delegate(&self) -> &Arc<dyn GridDialect> {
        &self.delegate
    }
}

impl fmt::Debug for ForwardingGridDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingGridDialect").finish_non_exhaustive()
    }
}

impl GridDialect for ForwardingGridDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Tuple>> {
        self.delegate.get_tuple(key, ctx)
    }

    fn create_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<Tuple> {
        self.delegate.create_tuple(key, ctx)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &mut TuplePointer,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.delegate.insert_or_update_tuple(key, tuple, ctx)
    }

    fn remove_tuple(&self, key: &EntityKey, ctx: &mut TransactionContext) -> GridResult<()> {
        self.delegate.remove_tuple(key, ctx)
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Option<Association>> {
        self.delegate.get_association(key, ctx)
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<Association> {
        self.delegate.create_association(key, ctx)
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &mut Association,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.delegate.insert_or_update_association(key, association, ctx)
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        self.delegate.remove_association(key, ctx)
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
        self.delegate.next_value(request, ctx)
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
        self.delegate.batchable()
    }

    fn optimistic_locking(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        self.delegate.optimistic_locking()
    }

    fn queryable(&self) -> Option<&dyn QueryableGridDialect> {
        self.delegate.queryable()
    }

    fn stored_procedures(&self) -> Option<&dyn StoredProcedureAwareGridDialect> {
        self.delegate.stored_procedures()
    }

    fn multiget(&self) -> Option<&dyn MultigetGridDialect> {
        self.delegate.multiget()
    }
}
