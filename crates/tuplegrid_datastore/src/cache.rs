//! Cache-backed dialect storing CBOR rows under a persistence strategy.

use crate::apply_operations;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace};
use tuplegrid_core::{
    BatchableGridDialect, CacheMappingType, DuplicateInsertPreventionStrategy, GridConfig,
    GridDialect, GridDialectOperation, GridError, GridResult, ModelConsumer, NextValueRequest,
    OptimisticLockingAwareGridDialect, PersistenceStrategy, SequenceDefinition,
    TransactionContext,
};
use tuplegrid_model::codec::{StoredAssociation, StoredTuple};
use tuplegrid_model::{
    from_cbor, to_canonical_cbor, Association, AssociationKey, AssociationKeyMetadata, EntityKey,
    EntityKeyMetadata, MapAssociationSnapshot, SnapshotType, Tuple, TuplePointer, Value,
};

/// Bounds on the keys a [`CacheDialect`] persists.
pub trait CacheKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Send + Sync + 'static> CacheKey for T {}

/// Returns a cache dialect laid out as `config.cache_mapping` asks.
pub fn cache_dialect(config: &GridConfig) -> Arc<dyn GridDialect> {
    match config.cache_mapping {
        CacheMappingType::CachePerTable => {
            Arc::new(CacheDialect::new(Arc::new(PersistenceStrategy::per_table())))
        }
        CacheMappingType::CachePerKind => {
            Arc::new(CacheDialect::new(Arc::new(PersistenceStrategy::per_kind())))
        }
    }
}

/// Dialect over the caches of a [`PersistenceStrategy`].
///
/// Rows are stored as CBOR bytes. Inserting a tuple whose snapshot is
/// [`SnapshotType::Insert`] fails with `EntityAlreadyExists` when the key is
/// taken, so no look-up is needed before inserts.
pub struct CacheDialect<EK: CacheKey, AK: CacheKey, ISK: CacheKey> {
    strategy: Arc<PersistenceStrategy<EK, AK, ISK>>,
}

impl<EK: CacheKey, AK: CacheKey, ISK: CacheKey> CacheDialect<EK, AK, ISK> {
    /// Creates a dialect over `strategy`.
    pub fn new(strategy: Arc<PersistenceStrategy<EK, AK, ISK>>) -> Self {
        Self { strategy }
    }

    /// Returns the persistence strategy.
    pub fn strategy(&self) -> &Arc<PersistenceStrategy<EK, AK, ISK>> {
        &self.strategy
    }

    fn apply(
        &self,
        operation: GridDialectOperation,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        match operation {
            GridDialectOperation::InsertOrUpdateTuple { key, tuple } => {
                self.insert_or_update_tuple(&key, &mut TuplePointer::new(tuple), ctx)
            }
            GridDialectOperation::RemoveTuple { key } => self.remove_tuple(&key, ctx),
            GridDialectOperation::InsertOrUpdateAssociation {
                key,
                mut association,
            } => self.insert_or_update_association(&key, &mut association, ctx),
            GridDialectOperation::RemoveAssociation { key } => self.remove_association(&key, ctx),
            other => Err(GridError::invalid_argument(format!(
                "{} cannot be part of a batch",
                other.kind()
            ))),
        }
    }
}

impl<EK: CacheKey, AK: CacheKey, ISK: CacheKey> fmt::Debug for CacheDialect<EK, AK, ISK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheDialect")
            .field("strategy", &self.strategy)
            .finish()
    }
}

fn encode_columns(columns: BTreeMap<String, Value>) -> GridResult<Vec<u8>> {
    Ok(to_canonical_cbor(&StoredTuple { columns })?)
}

fn decode_columns(bytes: &[u8]) -> GridResult<BTreeMap<String, Value>> {
    Ok(from_cbor::<StoredTuple>(bytes)?.columns)
}

fn lock_state_matches(stored: &BTreeMap<String, Value>, old_lock_state: &Tuple) -> bool {
    old_lock_state
        .column_names()
        .iter()
        .all(|column| stored.get(column) == old_lock_state.get(column).as_ref())
}

impl<EK: CacheKey, AK: CacheKey, ISK: CacheKey> GridDialect for CacheDialect<EK, AK, ISK> {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _ctx: &mut TransactionContext,
    ) -> GridResult<Option<Tuple>> {
        let cache = self.strategy.cache_manager().entity_cache(key.table());
        let persistent = self.strategy.key_provider().entity_key(key);
        let Some(bytes) = cache.get(&persistent).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Ok(Some(Tuple::from_columns(
            decode_columns(&bytes)?,
            SnapshotType::Update,
        )))
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
        let cache = self.strategy.cache_manager().entity_cache(key.table());
        let persistent = self.strategy.key_provider().entity_key(key);
        let inserting = tuple.tuple().snapshot_type() == SnapshotType::Insert;

        let columns = match cache.entry(persistent) {
            Entry::Occupied(_) if inserting => {
                return Err(GridError::entity_already_exists(key));
            }
            Entry::Occupied(mut entry) => {
                let mut columns = decode_columns(entry.get())?;
                apply_operations(&mut columns, tuple.tuple().operations());
                entry.insert(encode_columns(columns.clone())?);
                columns
            }
            Entry::Vacant(entry) => {
                let columns = tuple.tuple().to_column_map();
                entry.insert(encode_columns(columns.clone())?);
                columns
            }
        };
        trace!(target: "tuplegrid::datastore", key = %key, inserting, "tuple cached");
        tuple.set_tuple(Tuple::from_columns(columns, SnapshotType::Update));
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, _ctx: &mut TransactionContext) -> GridResult<()> {
        let cache = self.strategy.cache_manager().entity_cache(key.table());
        cache.remove(&self.strategy.key_provider().entity_key(key));
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _ctx: &mut TransactionContext,
    ) -> GridResult<Option<Association>> {
        let cache = self.strategy.cache_manager().association_cache(key.table());
        let persistent = self.strategy.key_provider().association_key(key);
        let Some(bytes) = cache.get(&persistent).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        let rows = from_cbor::<StoredAssociation>(&bytes)?.into_rows()?;
        Ok(Some(Association::with_snapshot(Arc::new(
            MapAssociationSnapshot::from_rows(rows),
        ))))
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
        key: &AssociationKey,
        association: &mut Association,
        _ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        let cache = self.strategy.cache_manager().association_cache(key.table());
        let persistent = self.strategy.key_provider().association_key(key);
        let stored = StoredAssociation::from_association(key.table(), association);
        cache.insert(persistent, to_canonical_cbor(&stored)?);
        *association = std::mem::take(association).into_applied();
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        _ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        let cache = self.strategy.cache_manager().association_cache(key.table());
        cache.remove(&self.strategy.key_provider().association_key(key));
        Ok(())
    }

    fn is_stored_in_entity_structure(&self, _metadata: &AssociationKeyMetadata) -> bool {
        false
    }

    fn define_sequences(&self, sequences: &[SequenceDefinition]) -> GridResult<()> {
        for sequence in sequences {
            let key = sequence.key();
            let counters = self.strategy.cache_manager().id_source_cache(key.table());
            let persistent = self.strategy.key_provider().id_source_key(&key);
            if counters.define(persistent, sequence.initial_value) {
                debug!(
                    target: "tuplegrid::datastore",
                    sequence = key.table(),
                    initial_value = sequence.initial_value,
                    "sequence defined"
                );
            }
        }
        Ok(())
    }

    fn next_value(
        &self,
        request: &NextValueRequest,
        _ctx: &mut TransactionContext,
    ) -> GridResult<i64> {
        let counters = self
            .strategy
            .cache_manager()
            .id_source_cache(request.key.table());
        let persistent = self.strategy.key_provider().id_source_key(&request.key);
        counters.next_value_for(&persistent, request)
    }

    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        metadata: &EntityKeyMetadata,
    ) -> GridResult<()> {
        let cache = self.strategy.cache_manager().entity_cache(metadata.table());
        let provider = self.strategy.key_provider();
        // Shared caches hold every table; keep only keys of this one.
        let keys: Vec<EK> = cache
            .iter()
            .filter(|entry| provider.to_entity_key(metadata, entry.key()).table() == metadata.table())
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            let Some(bytes) = cache.get(&key).map(|entry| entry.value().clone()) else {
                continue;
            };
            consumer.consume(Tuple::from_columns(
                decode_columns(&bytes)?,
                SnapshotType::Update,
            ))?;
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
        Some(self)
    }

    fn optimistic_locking(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        Some(self)
    }
}

impl<EK: CacheKey, AK: CacheKey, ISK: CacheKey> BatchableGridDialect for CacheDialect<EK, AK, ISK> {
    fn execute_batch(
        &self,
        operations: Vec<GridDialectOperation>,
        ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        debug!(
            target: "tuplegrid::datastore",
            transaction = %ctx.id(),
            operations = operations.len(),
            "applying batch"
        );
        for operation in operations {
            self.apply(operation, ctx)?;
        }
        Ok(())
    }
}

impl<EK: CacheKey, AK: CacheKey, ISK: CacheKey> OptimisticLockingAwareGridDialect
    for CacheDialect<EK, AK, ISK>
{
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &mut TuplePointer,
        _ctx: &mut TransactionContext,
    ) -> GridResult<bool> {
        let cache = self.strategy.cache_manager().entity_cache(key.table());
        let persistent = self.strategy.key_provider().entity_key(key);
        let Entry::Occupied(mut entry) = cache.entry(persistent) else {
            return Ok(false);
        };
        let mut columns = decode_columns(entry.get())?;
        if !lock_state_matches(&columns, old_lock_state) {
            debug!(target: "tuplegrid::datastore", key = %key, "stale lock state");
            return Ok(false);
        }
        apply_operations(&mut columns, tuple.tuple().operations());
        entry.insert(encode_columns(columns.clone())?);
        drop(entry);
        tuple.set_tuple(Tuple::from_columns(columns, SnapshotType::Update));
        Ok(true)
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        _ctx: &mut TransactionContext,
    ) -> GridResult<bool> {
        let cache = self.strategy.cache_manager().entity_cache(key.table());
        let persistent = self.strategy.key_provider().entity_key(key);
        let Entry::Occupied(entry) = cache.entry(persistent) else {
            return Ok(false);
        };
        if !lock_state_matches(&decode_columns(entry.get())?, old_lock_state) {
            return Ok(false);
        }
        entry.remove();
        Ok(true)
    }
}
