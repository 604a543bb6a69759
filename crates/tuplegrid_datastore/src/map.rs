//! Map-backed datastore for tests and embedded use.

use crate::apply_operations;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use tuplegrid_core::{
    AtomicCounters, BackendQuery, DuplicateInsertPreventionStrategy, GridDialect, GridError,
    GridResult, ModelConsumer, MultigetGridDialect, NextValueRequest, ProcedureParameters,
    QueryableGridDialect, RowSelection, SequenceDefinition, StoredProcedureAwareGridDialect,
    StoredProcedureRegistry, TransactionContext,
};
use tuplegrid_model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, IdSourceKey,
    MapAssociationSnapshot, RowKey, SnapshotType, Tuple, TuplePointer, Value,
};
use tuplegrid_query::QueryParameters;

/// Shared storage behind one or more [`MapDialect`]s.
///
/// Entities and associations live in sharded concurrent maps, so writers to
/// different keys do not contend.
#[derive(Default)]
pub struct MapDatastore {
    entities: DashMap<EntityKey, BTreeMap<String, Value>>,
    associations: DashMap<AssociationKey, Vec<(RowKey, BTreeMap<String, Value>)>>,
    sequences: AtomicCounters<IdSourceKey>,
}

impl MapDatastore {
    /// Creates an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities across all tables.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of stored associations.
    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    /// Stored columns of an entity.
    pub fn entity(&self, key: &EntityKey) -> Option<BTreeMap<String, Value>> {
        self.entities.get(key).map(|columns| columns.value().clone())
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.entities.clear();
        self.associations.clear();
    }
}

impl fmt::Debug for MapDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapDatastore")
            .field("entities", &self.entities.len())
            .field("associations", &self.associations.len())
            .field("sequences", &self.sequences.len())
            .finish()
    }
}

type StoredRows = Vec<(RowKey, BTreeMap<String, Value>)>;

/// Dialect over a [`MapDatastore`].
///
/// Duplicate inserts are detected by look-up. Queries must be
/// [`BackendQuery::Memory`]; without sort columns, rows come back ordered by
/// key so that paging is stable.
///
/// With [`MapDialect::with_embedded_associations`], association rows live in
/// one column of the owning entity, named after the collection role (or the
/// association table when the role is empty). Such rows disappear with their
/// owner, and the owner must be stored before its associations.
#[derive(Debug, Clone)]
pub struct MapDialect {
    datastore: Arc<MapDatastore>,
    procedures: StoredProcedureRegistry,
    embedded_associations: bool,
}

impl MapDialect {
    /// Creates a dialect over `datastore` with no stored procedures.
    pub fn new(datastore: Arc<MapDatastore>) -> Self {
        Self {
            datastore,
            procedures: StoredProcedureRegistry::new(),
            embedded_associations: false,
        }
    }

    /// Stores association rows inside the owning entity.
    #[must_use]
    pub fn with_embedded_associations(mut self) -> Self {
        self.embedded_associations = true;
        self
    }

    /// Sets the stored procedures this dialect can call.
    #[must_use]
    pub fn with_procedures(mut self, procedures: StoredProcedureRegistry) -> Self {
        self.procedures = procedures;
        self
    }

    /// Returns the backing datastore.
    pub fn datastore(&self) -> &Arc<MapDatastore> {
        &self.datastore
    }

    /// Keys of the entities currently stored in `table`.
    ///
    /// Rows are fetched one at a time afterwards, so no shard lock is held
    /// while a caller works on a row.
    fn table_keys(&self, table: &str) -> Vec<EntityKey> {
        self.datastore
            .entities
            .iter()
            .filter(|entry| entry.key().table() == table)
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn row(&self, key: &EntityKey) -> Option<Tuple> {
        self.datastore
            .entity(key)
            .map(|columns| Tuple::from_columns(columns, SnapshotType::Update))
    }

    fn stored_rows(&self, key: &AssociationKey) -> GridResult<Option<StoredRows>> {
        if !self.embedded_associations {
            return Ok(self
                .datastore
                .associations
                .get(key)
                .map(|rows| rows.value().clone()));
        }
        let column = embedded_column(key.metadata());
        match self.datastore.entities.get(key.entity_key()) {
            Some(owner) => owner
                .value()
                .get(column)
                .map(|value| unembed_rows(key.metadata(), value))
                .transpose(),
            None => Ok(None),
        }
    }
}

fn embedded_column(metadata: &AssociationKeyMetadata) -> &str {
    if metadata.collection_role().is_empty() {
        metadata.table()
    } else {
        metadata.collection_role()
    }
}

/// Encodes rows as `[[row key values], [[column, value], ...]]` per row.
fn embed_rows(rows: StoredRows) -> Value {
    Value::Array(
        rows.into_iter()
            .map(|(row_key, columns)| {
                let columns = columns
                    .into_iter()
                    .map(|(name, value)| Value::Array(vec![Value::Text(name), value]))
                    .collect();
                Value::Array(vec![
                    Value::Array(row_key.column_values().to_vec()),
                    Value::Array(columns),
                ])
            })
            .collect(),
    )
}

fn unembed_rows(metadata: &AssociationKeyMetadata, value: &Value) -> GridResult<StoredRows> {
    let malformed = || {
        GridError::invalid_operation(format!(
            "column {} does not hold embedded association rows",
            embedded_column(metadata)
        ))
    };
    let rows = value.as_array().ok_or_else(malformed)?;
    rows.iter()
        .map(|row| {
            let [key_values, columns] = row.as_array().ok_or_else(malformed)? else {
                return Err(malformed());
            };
            let key_values = key_values.as_array().ok_or_else(malformed)?;
            let row_key = RowKey::new(
                metadata.table(),
                metadata.row_key_column_names().iter().cloned(),
                key_values.to_vec(),
            );
            let columns = columns
                .as_array()
                .ok_or_else(malformed)?
                .iter()
                .map(|pair| match pair.as_array() {
                    Some([Value::Text(name), value]) => Ok((name.clone(), value.clone())),
                    _ => Err(malformed()),
                })
                .collect::<GridResult<BTreeMap<_, _>>>()?;
            Ok((row_key, columns))
        })
        .collect()
}

impl GridDialect for MapDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _ctx: &mut TransactionContext,
    ) -> GridResult<Option<Tuple>> {
        Ok(self.row(key))
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
        let mut stored = self.datastore.entities.entry(key.clone()).or_default();
        apply_operations(&mut stored, tuple.tuple().operations());
        let applied = Tuple::from_columns(stored.clone(), SnapshotType::Update);
        drop(stored);
        trace!(target: "tuplegrid::datastore", key = %key, "tuple stored");
        tuple.set_tuple(applied);
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, _ctx: &mut TransactionContext) -> GridResult<()> {
        self.datastore.entities.remove(key);
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _ctx: &mut TransactionContext,
    ) -> GridResult<Option<Association>> {
        Ok(self.stored_rows(key)?.map(|rows| {
            let rows = rows.into_iter().map(|(row_key, columns)| {
                (row_key, Tuple::from_columns(columns, SnapshotType::Update))
            });
            Association::with_snapshot(Arc::new(MapAssociationSnapshot::from_rows(rows)))
        }))
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
        let rows: StoredRows = association
            .rows()
            .into_iter()
            .map(|(row_key, tuple)| (row_key, tuple.to_column_map()))
            .collect();
        if self.embedded_associations {
            let mut owner = self
                .datastore
                .entities
                .get_mut(key.entity_key())
                .ok_or_else(|| {
                    GridError::invalid_operation(format!(
                        "owner {} of embedded association {} is not stored",
                        key.entity_key(),
                        key.table()
                    ))
                })?;
            owner.insert(embedded_column(key.metadata()).to_owned(), embed_rows(rows));
        } else {
            self.datastore.associations.insert(key.clone(), rows);
        }
        *association = std::mem::take(association).into_applied();
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        _ctx: &mut TransactionContext,
    ) -> GridResult<()> {
        if self.embedded_associations {
            if let Some(mut owner) = self.datastore.entities.get_mut(key.entity_key()) {
                owner.remove(embedded_column(key.metadata()));
            }
        } else {
            self.datastore.associations.remove(key);
        }
        Ok(())
    }

    fn is_stored_in_entity_structure(&self, _metadata: &AssociationKeyMetadata) -> bool {
        self.embedded_associations
    }

    fn define_sequences(&self, sequences: &[SequenceDefinition]) -> GridResult<()> {
        for sequence in sequences {
            if self
                .datastore
                .sequences
                .define(sequence.key(), sequence.initial_value)
            {
                debug!(
                    target: "tuplegrid::datastore",
                    sequence = sequence.metadata.name(),
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
        self.datastore.sequences.next_value_for(&request.key, request)
    }

    fn for_each_tuple(
        &self,
        consumer: &mut dyn ModelConsumer,
        metadata: &EntityKeyMetadata,
    ) -> GridResult<()> {
        for key in self.table_keys(metadata.table()) {
            if let Some(tuple) = self.row(&key) {
                consumer.consume(tuple)?;
            }
        }
        Ok(())
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::LookUp
    }

    fn queryable(&self) -> Option<&dyn QueryableGridDialect> {
        Some(self)
    }

    fn stored_procedures(&self) -> Option<&dyn StoredProcedureAwareGridDialect> {
        Some(self)
    }

    fn multiget(&self) -> Option<&dyn MultigetGridDialect> {
        Some(self)
    }
}

impl QueryableGridDialect for MapDialect {
    fn execute_backend_query(
        &self,
        query: &BackendQuery,
        params: &QueryParameters,
        selection: &RowSelection,
        _ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Tuple>> {
        let BackendQuery::Memory(descriptor) = query else {
            return Err(GridError::unsupported(format!(
                "{} queries on map datastore",
                query.language()
            )));
        };
        let memory = &descriptor.query;

        let mut matched = Vec::new();
        for key in self.table_keys(&memory.table) {
            let Some(tuple) = self.row(&key) else {
                continue;
            };
            if memory.filter.matches(&tuple, params)? {
                matched.push((key, tuple));
            }
        }
        matched.sort_by(|(a, _), (b, _)| a.column_values().cmp(b.column_values()));
        let mut rows: Vec<Tuple> = matched.into_iter().map(|(_, tuple)| tuple).collect();
        memory.sort(&mut rows);

        let total = rows.len();
        let rows: Vec<Tuple> = selection
            .apply(rows)?
            .into_iter()
            .map(|tuple| memory.project(tuple))
            .collect();
        debug!(
            target: "tuplegrid::datastore",
            table = %memory.table,
            matched = total,
            returned = rows.len(),
            "query executed"
        );
        Ok(rows)
    }
}

impl StoredProcedureAwareGridDialect for MapDialect {
    fn call_stored_procedure(
        &self,
        name: &str,
        params: &ProcedureParameters,
        _ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Tuple>> {
        self.procedures.call(name, params)
    }
}

impl MultigetGridDialect for MapDialect {
    fn get_tuples(
        &self,
        keys: &[EntityKey],
        ctx: &mut TransactionContext,
    ) -> GridResult<Vec<Option<Tuple>>> {
        keys.iter().map(|key| self.get_tuple(key, ctx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuplegrid_core::{DialectFacet, GridDialects, TransactionId};
    use tuplegrid_model::{AssociationKind, IdSourceKeyMetadata};
    use tuplegrid_query::{EntityMapping, MappingRegistry, Predicate, QueryTree, SortOrder};

    fn ctx() -> TransactionContext {
        TransactionContext::new(TransactionId::new(1))
    }

    fn poem(id: i64) -> EntityKey {
        EntityKey::new(EntityKeyMetadata::new("Poem", ["id"]), vec![Value::Integer(id)])
    }

    fn store(dialect: &MapDialect, id: i64, author: &str, year: i64) {
        let mut tuple = dialect.create_tuple(&poem(id), &mut ctx()).unwrap();
        tuple.put("id", id);
        tuple.put("author", author);
        tuple.put("year", year);
        dialect
            .insert_or_update_tuple(&poem(id), &mut TuplePointer::new(tuple), &mut ctx())
            .unwrap();
    }

    #[test]
    fn advertises_facets() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        assert_eq!(
            GridDialects::facets(&dialect),
            vec![
                DialectFacet::Queryable,
                DialectFacet::StoredProcedures,
                DialectFacet::Multiget,
            ]
        );
        assert_eq!(
            dialect.duplicate_insert_prevention_strategy(poem(1).metadata()),
            DuplicateInsertPreventionStrategy::LookUp
        );
    }

    #[test]
    fn applies_tuple_operations() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        store(&dialect, 1, "Oscar Wilde", 1881);

        let mut tuple = dialect.get_tuple(&poem(1), &mut ctx()).unwrap().unwrap();
        tuple.remove("year");
        tuple.put("title", Value::Null);
        let mut pointer = TuplePointer::new(tuple);
        dialect
            .insert_or_update_tuple(&poem(1), &mut pointer, &mut ctx())
            .unwrap();

        let stored = dialect.datastore().entity(&poem(1)).unwrap();
        assert!(!stored.contains_key("year"));
        assert_eq!(stored.get("title"), Some(&Value::Null));
        assert!(!pointer.tuple().has_changes());
    }

    #[test]
    fn associations_keep_row_order() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        let owner = poem(1);
        let meta = AssociationKeyMetadata::builder("Poem_lines")
            .column_names(["poem_id"])
            .row_key_column_names(["poem_id", "line"])
            .kind(AssociationKind::EmbeddedCollection)
            .build();
        let key = AssociationKey::new(meta, vec![Value::Integer(1)], owner);

        let mut association = dialect.create_association(&key, &mut ctx()).unwrap();
        for line in [3, 1, 2] {
            let row_key = RowKey::new(
                "Poem_lines",
                ["poem_id", "line"],
                vec![Value::Integer(1), Value::Integer(line)],
            );
            let mut row = Tuple::new();
            row.put("line", line);
            association.put(row_key, row);
        }
        dialect
            .insert_or_update_association(&key, &mut association, &mut ctx())
            .unwrap();

        let loaded = dialect.get_association(&key, &mut ctx()).unwrap().unwrap();
        let lines: Vec<Option<Value>> = loaded
            .row_keys()
            .iter()
            .map(|k| k.column_value("line").cloned())
            .collect();
        assert_eq!(
            lines,
            vec![
                Some(Value::Integer(3)),
                Some(Value::Integer(1)),
                Some(Value::Integer(2)),
            ]
        );
        assert_eq!(loaded.size(), 3);
    }

    #[test]
    fn sequences_start_at_defined_value() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        let sequence = SequenceDefinition::new(IdSourceKeyMetadata::for_sequence("poem_seq"), 100);
        let request = NextValueRequest::new(sequence.key(), 10, 1);

        let err = dialect.next_value(&request, &mut ctx()).unwrap_err();
        assert!(matches!(err, GridError::InvalidOperation { .. }));

        dialect.define_sequences(&[sequence.clone()]).unwrap();
        assert_eq!(dialect.next_value(&request, &mut ctx()).unwrap(), 100);
        assert_eq!(dialect.next_value(&request, &mut ctx()).unwrap(), 110);

        dialect.define_sequences(&[sequence]).unwrap();
        assert_eq!(dialect.next_value(&request, &mut ctx()).unwrap(), 120);
    }

    #[test]
    fn table_generators_need_no_definition() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        let table = IdSourceKeyMetadata::for_table("generators", "name", "next");
        let request = NextValueRequest::new(IdSourceKey::for_table(table, "Poem"), 1, 5);
        assert_eq!(dialect.next_value(&request, &mut ctx()).unwrap(), 5);
        assert_eq!(dialect.next_value(&request, &mut ctx()).unwrap(), 6);
    }

    fn poem_lines(owner: i64) -> AssociationKey {
        let meta = AssociationKeyMetadata::builder("Poem_lines")
            .column_names(["poem_id"])
            .row_key_column_names(["poem_id", "line"])
            .kind(AssociationKind::EmbeddedCollection)
            .collection_role("lines")
            .build();
        AssociationKey::new(meta, vec![Value::Integer(owner)], poem(owner))
    }

    fn line_row(owner: i64, line: i64, text: &str) -> (RowKey, Tuple) {
        let row_key = RowKey::new(
            "Poem_lines",
            ["poem_id", "line"],
            vec![Value::Integer(owner), Value::Integer(line)],
        );
        let mut row = Tuple::new();
        row.put("line", line);
        row.put("text", text);
        (row_key, row)
    }

    #[test]
    fn embedded_associations_live_in_the_owner() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new())).with_embedded_associations();
        let key = poem_lines(1);
        assert!(dialect.is_stored_in_entity_structure(key.metadata()));
        store(&dialect, 1, "Oscar Wilde", 1881);

        let mut association = dialect.create_association(&key, &mut ctx()).unwrap();
        for (line, text) in [(2, "Yet each man kills"), (1, "the thing he loves")] {
            let (row_key, row) = line_row(1, line, text);
            association.put(row_key, row);
        }
        dialect
            .insert_or_update_association(&key, &mut association, &mut ctx())
            .unwrap();
        assert_eq!(dialect.datastore().association_count(), 0);
        assert!(dialect.datastore().entity(&poem(1)).unwrap().contains_key("lines"));

        let loaded = dialect.get_association(&key, &mut ctx()).unwrap().unwrap();
        assert_eq!(loaded.row_keys(), vec![line_row(1, 2, "").0, line_row(1, 1, "").0]);
        let first = loaded.get(&line_row(1, 2, "").0).unwrap();
        assert_eq!(first.get("text"), Some(Value::from("Yet each man kills")));

        dialect.remove_tuple(&poem(1), &mut ctx()).unwrap();
        assert!(dialect.get_association(&key, &mut ctx()).unwrap().is_none());
    }

    #[test]
    fn embedded_associations_need_a_stored_owner() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new())).with_embedded_associations();
        let key = poem_lines(9);
        let mut association = dialect.create_association(&key, &mut ctx()).unwrap();
        let (row_key, row) = line_row(9, 1, "orphan");
        association.put(row_key, row);

        let err = dialect
            .insert_or_update_association(&key, &mut association, &mut ctx())
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidOperation { .. }));
        assert_eq!(dialect.datastore().entity_count(), 0);
    }

    #[test]
    fn removing_an_embedded_association_keeps_the_owner() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new())).with_embedded_associations();
        let key = poem_lines(1);
        store(&dialect, 1, "Oscar Wilde", 1881);
        let mut association = dialect.create_association(&key, &mut ctx()).unwrap();
        let (row_key, row) = line_row(1, 1, "Some kill their love");
        association.put(row_key, row);
        dialect
            .insert_or_update_association(&key, &mut association, &mut ctx())
            .unwrap();

        dialect.remove_association(&key, &mut ctx()).unwrap();
        let owner = dialect.datastore().entity(&poem(1)).unwrap();
        assert!(!owner.contains_key("lines"));
        assert_eq!(owner.get("author"), Some(&Value::from("Oscar Wilde")));
    }

    #[test]
    fn queries_filter_sort_and_project() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        store(&dialect, 1, "Oscar Wilde", 1881);
        store(&dialect, 2, "Emily Dickinson", 1890);
        store(&dialect, 3, "Oscar Wilde", 1898);

        let mapping = MappingRegistry::new().with(EntityMapping::new("Poem"));
        let tree = QueryTree::from_entity("Poem")
            .filter(Predicate::like("author", "Oscar%"))
            .select(["year"])
            .order_by("year", SortOrder::Descending);
        let query = BackendQuery::memory(&tree, &mapping).unwrap();

        let rows = dialect
            .execute_backend_query(&query, &QueryParameters::new(), &RowSelection::all(), &mut ctx())
            .unwrap();
        let years: Vec<Option<Value>> = rows.iter().map(|t| t.get("year")).collect();
        assert_eq!(years, vec![Some(Value::Integer(1898)), Some(Value::Integer(1881))]);
        assert!(rows[0].get("author").is_none());
    }

    #[test]
    fn other_query_languages_are_unsupported() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        let mapping = MappingRegistry::new().with(EntityMapping::new("Poem"));
        let query = BackendQuery::cypher(&QueryTree::from_entity("Poem"), &mapping, "n").unwrap();
        let err = dialect
            .execute_backend_query(&query, &QueryParameters::new(), &RowSelection::all(), &mut ctx())
            .unwrap_err();
        assert!(matches!(err, GridError::UnsupportedOperation { .. }));
    }

    #[test]
    fn scans_skip_rows_removed_while_scanning() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        for id in 1..=5 {
            store(&dialect, id, "Emily Dickinson", 1890);
        }
        let mut seen = 0;
        let mut consume = |_: Tuple| -> GridResult<()> {
            seen += 1;
            for id in 1..=5 {
                dialect.remove_tuple(&poem(id), &mut ctx())?;
            }
            Ok(())
        };
        dialect
            .for_each_tuple(&mut consume, poem(1).metadata())
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn multiget_leaves_holes() {
        let dialect = MapDialect::new(Arc::new(MapDatastore::new()));
        store(&dialect, 2, "Emily Dickinson", 1890);
        let rows = dialect.get_tuples(&[poem(1), poem(2)], &mut ctx()).unwrap();
        assert!(rows[0].is_none());
        assert!(rows[1].is_some());
    }
}
