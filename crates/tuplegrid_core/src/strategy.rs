//! Key mapping and cache layout for key/value stores.
//!
//! A [`PersistenceStrategy`] pairs a [`KeyProvider`], which turns core keys
//! into the keys actually persisted, with a [`CacheManager`], which owns the
//! named caches those keys live in. Two layouts exist:
//!
//! - per table: one cache per table, keys without the table name
//! - per kind: three shared caches, keys embedding the table name

use crate::id::AtomicCounters;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tuplegrid_model::{AssociationKey, EntityKey, EntityKeyMetadata, IdSourceKey, Value};

/// How keys are spread over caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMappingType {
    /// One cache per entity table, association table and generator.
    #[default]
    CachePerTable,
    /// One cache each for entities, associations and generators.
    CachePerKind,
}

/// Name of the shared entity cache.
pub const ENTITY_CACHE: &str = "ENTITIES";
/// Name of the shared association cache.
pub const ASSOCIATION_CACHE: &str = "ASSOCIATIONS";
/// Name of the shared generator cache.
pub const ID_SOURCE_CACHE: &str = "IDENTIFIERS";

/// Converts core keys into persisted keys. Pure and thread-safe.
pub trait KeyProvider<EK, AK, ISK>: Send + Sync {
    /// Persisted form of an entity key.
    fn entity_key(&self, key: &EntityKey) -> EK;

    /// Persisted form of an association key.
    fn association_key(&self, key: &AssociationKey) -> AK;

    /// Persisted form of a generator key.
    fn id_source_key(&self, key: &IdSourceKey) -> ISK;

    /// Rebuilds the core key of an entity of kind `metadata`.
    fn to_entity_key(&self, metadata: &EntityKeyMetadata, key: &EK) -> EntityKey;
}

/// Entity key stored in a per-table cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistentEntityKey {
    /// Key column names.
    pub column_names: Vec<String>,
    /// Key column values.
    pub column_values: Vec<Value>,
}

/// Association key stored in a per-table cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistentAssociationKey {
    /// Key column names.
    pub column_names: Vec<String>,
    /// Key column values.
    pub column_values: Vec<Value>,
}

/// Generator key stored in a per-table cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistentIdSourceKey {
    /// Segment column name; the sequence name for sequences.
    pub column_name: String,
    /// Segment value.
    pub column_value: String,
}

/// Keys for the per-table layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerTableKeyProvider;

impl KeyProvider<PersistentEntityKey, PersistentAssociationKey, PersistentIdSourceKey>
    for PerTableKeyProvider
{
    fn entity_key(&self, key: &EntityKey) -> PersistentEntityKey {
        PersistentEntityKey {
            column_names: key.column_names().to_vec(),
            column_values: key.column_values().to_vec(),
        }
    }

    fn association_key(&self, key: &AssociationKey) -> PersistentAssociationKey {
        PersistentAssociationKey {
            column_names: key.column_names().to_vec(),
            column_values: key.column_values().to_vec(),
        }
    }

    fn id_source_key(&self, key: &IdSourceKey) -> PersistentIdSourceKey {
        PersistentIdSourceKey {
            column_name: key.metadata().key_column_name().to_string(),
            column_value: key.segment_value().to_string(),
        }
    }

    fn to_entity_key(
        &self,
        metadata: &EntityKeyMetadata,
        key: &PersistentEntityKey,
    ) -> EntityKey {
        EntityKey::new(metadata.clone(), key.column_values.clone())
    }
}

/// Keys for the per-kind layout: the core keys themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerKindKeyProvider;

impl KeyProvider<EntityKey, AssociationKey, IdSourceKey> for PerKindKeyProvider {
    fn entity_key(&self, key: &EntityKey) -> EntityKey {
        key.clone()
    }

    fn association_key(&self, key: &AssociationKey) -> AssociationKey {
        key.clone()
    }

    fn id_source_key(&self, key: &IdSourceKey) -> IdSourceKey {
        key.clone()
    }

    fn to_entity_key(&self, _metadata: &EntityKeyMetadata, key: &EntityKey) -> EntityKey {
        key.clone()
    }
}

/// A named cache of encoded values.
pub type Cache<K> = Arc<DashMap<K, Vec<u8>>>;

/// Owns the caches of one persistence strategy, created on first use.
pub struct CacheManager<EK, AK, ISK>
where
    EK: Eq + Hash,
    AK: Eq + Hash,
    ISK: Eq + Hash,
{
    mapping: CacheMappingType,
    entity_caches: DashMap<String, Cache<EK>>,
    association_caches: DashMap<String, Cache<AK>>,
    id_source_caches: DashMap<String, Arc<AtomicCounters<ISK>>>,
}

impl<EK, AK, ISK> CacheManager<EK, AK, ISK>
where
    EK: Eq + Hash + Clone,
    AK: Eq + Hash + Clone,
    ISK: Eq + Hash + Clone,
{
    /// Creates a manager for `mapping` with no caches yet.
    pub fn new(mapping: CacheMappingType) -> Self {
        Self {
            mapping,
            entity_caches: DashMap::new(),
            association_caches: DashMap::new(),
            id_source_caches: DashMap::new(),
        }
    }

    /// Layout of this manager.
    pub fn mapping(&self) -> CacheMappingType {
        self.mapping
    }

    /// Name of the cache holding entities of `table`.
    pub fn entity_cache_name(&self, table: &str) -> String {
        match self.mapping {
            CacheMappingType::CachePerKind => ENTITY_CACHE.to_string(),
            CacheMappingType::CachePerTable => table.to_string(),
        }
    }

    /// Name of the cache holding associations of `table`.
    pub fn association_cache_name(&self, table: &str) -> String {
        match self.mapping {
            CacheMappingType::CachePerKind => ASSOCIATION_CACHE.to_string(),
            CacheMappingType::CachePerTable => format!("associations_{table}"),
        }
    }

    /// Name of the cache holding generator `name`.
    pub fn id_source_cache_name(&self, name: &str) -> String {
        match self.mapping {
            CacheMappingType::CachePerKind => ID_SOURCE_CACHE.to_string(),
            CacheMappingType::CachePerTable => name.to_string(),
        }
    }

    /// Cache holding entities of `table`.
    pub fn entity_cache(&self, table: &str) -> Cache<EK> {
        Arc::clone(
            self.entity_caches
                .entry(self.entity_cache_name(table))
                .or_default()
                .value(),
        )
    }

    /// Cache holding associations of `table`.
    pub fn association_cache(&self, table: &str) -> Cache<AK> {
        Arc::clone(
            self.association_caches
                .entry(self.association_cache_name(table))
                .or_default()
                .value(),
        )
    }

    /// Counters of generator `name`.
    pub fn id_source_cache(&self, name: &str) -> Arc<AtomicCounters<ISK>> {
        Arc::clone(
            self.id_source_caches
                .entry(self.id_source_cache_name(name))
                .or_default()
                .value(),
        )
    }

    /// Names of every cache created so far, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entity_caches
            .iter()
            .map(|e| e.key().clone())
            .chain(self.association_caches.iter().map(|e| e.key().clone()))
            .chain(self.id_source_caches.iter().map(|e| e.key().clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl<EK: Eq + Hash, AK: Eq + Hash, ISK: Eq + Hash> fmt::Debug for CacheManager<EK, AK, ISK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("mapping", &self.mapping)
            .field("entity_caches", &self.entity_caches.len())
            .field("association_caches", &self.association_caches.len())
            .field("id_source_caches", &self.id_source_caches.len())
            .finish()
    }
}

/// A key provider and the caches its keys live in.
pub struct PersistenceStrategy<EK, AK, ISK>
where
    EK: Eq + Hash,
    AK: Eq + Hash,
    ISK: Eq + Hash,
{
    cache_manager: CacheManager<EK, AK, ISK>,
    key_provider: Arc<dyn KeyProvider<EK, AK, ISK>>,
}

impl PersistenceStrategy<PersistentEntityKey, PersistentAssociationKey, PersistentIdSourceKey> {
    /// One cache per table.
    pub fn per_table() -> Self {
        Self {
            cache_manager: CacheManager::new(CacheMappingType::CachePerTable),
            key_provider: Arc::new(PerTableKeyProvider),
        }
    }
}

impl PersistenceStrategy<EntityKey, AssociationKey, IdSourceKey> {
    /// Three caches shared by every table.
    pub fn per_kind() -> Self {
        Self {
            cache_manager: CacheManager::new(CacheMappingType::CachePerKind),
            key_provider: Arc::new(PerKindKeyProvider),
        }
    }
}

impl<EK, AK, ISK> PersistenceStrategy<EK, AK, ISK>
where
    EK: Eq + Hash,
    AK: Eq + Hash,
    ISK: Eq + Hash,
{
    /// Returns the cache manager.
    pub fn cache_manager(&self) -> &CacheManager<EK, AK, ISK> {
        &self.cache_manager
    }

    /// Returns the key provider.
    pub fn key_provider(&self) -> &dyn KeyProvider<EK, AK, ISK> {
        self.key_provider.as_ref()
    }
}

impl<EK: Eq + Hash, AK: Eq + Hash, ISK: Eq + Hash> fmt::Debug for PersistenceStrategy<EK, AK, ISK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceStrategy")
            .field("cache_manager", &self.cache_manager)
            .finish_non_exhaustive()
    }
}
