//! Identifiers for entities, associations, association rows and id sources.
//!
//! Keys are immutable values. Cloning is cheap: table names, column names
//! and column values are shared behind `Arc`s. Equality and hashing are
//! structural over table, column names and column values.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;

fn shared_names<I, S>(names: I) -> Arc<[String]>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

fn write_columns(f: &mut fmt::Formatter<'_>, names: &[String], values: &[Value]) -> fmt::Result {
    f.write_str("[")?;
    for (i, (name, value)) in names.iter().zip(values.iter()).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{name}={value}")?;
    }
    f.write_str("]")
}

/// Static description of an entity's storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKeyMetadata {
    table: Arc<str>,
    column_names: Arc<[String]>,
}

impl EntityKeyMetadata {
    /// Creates entity key metadata for `table` identified by `column_names`.
    pub fn new<I, S>(table: impl Into<String>, column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: Arc::from(table.into()),
            column_names: shared_names(column_names),
        }
    }

    /// Returns the table (collection, label, cache) name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the id column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether `column` is one of the id columns.
    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

/// Identifies one logical row of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    metadata: EntityKeyMetadata,
    column_values: Arc<[Value]>,
}

impl EntityKey {
    /// Creates a key from metadata and id column values.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the number of id columns.
    pub fn new(metadata: EntityKeyMetadata, column_values: impl Into<Vec<Value>>) -> Self {
        let column_values: Vec<Value> = column_values.into();
        assert_eq!(
            metadata.column_names.len(),
            column_values.len(),
            "entity key for {} expects {} values",
            metadata.table,
            metadata.column_names.len()
        );
        Self {
            metadata,
            column_values: column_values.into(),
        }
    }

    /// Returns the key metadata.
    pub fn metadata(&self) -> &EntityKeyMetadata {
        &self.metadata
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    /// Returns the id column names.
    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    /// Returns the id column values.
    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Returns the value of an id column.
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.column_names()
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({}", self.table())?;
        write_columns(f, self.column_names(), &self.column_values)?;
        f.write_str(")")
    }
}

/// Kind of relationship an association represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// Collection of entities referencing the owner.
    OneToMany,
    /// Join pairs between two entity types.
    ManyToMany,
    /// Collection of embeddables or basic values owned by the entity.
    EmbeddedCollection,
}

/// Static description of an association's storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationKeyMetadata {
    table: Arc<str>,
    column_names: Arc<[String]>,
    row_key_column_names: Arc<[String]>,
    row_key_index_column_names: Arc<[String]>,
    kind: AssociationKind,
    associated_entity: Option<EntityKeyMetadata>,
    collection_role: Arc<str>,
    inverse: bool,
}

impl AssociationKeyMetadata {
    /// Starts building metadata for an association stored in `table`.
    pub fn builder(table: impl Into<String>) -> AssociationKeyMetadataBuilder {
        AssociationKeyMetadataBuilder::new(table)
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the owner-side columns selecting the association's rows.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Returns the columns that identify one row of the association.
    pub fn row_key_column_names(&self) -> &[String] {
        &self.row_key_column_names
    }

    /// Returns the index columns (list index, map key) of the row key.
    pub fn row_key_index_column_names(&self) -> &[String] {
        &self.row_key_index_column_names
    }

    /// Returns the association kind.
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Returns the metadata of the entity on the other side, if any.
    pub fn associated_entity(&self) -> Option<&EntityKeyMetadata> {
        self.associated_entity.as_ref()
    }

    /// Returns the collection role (e.g. `Order.lines`).
    pub fn collection_role(&self) -> &str {
        &self.collection_role
    }

    /// Whether this side is the inverse (non-owning) side.
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    /// Whether the given column belongs to the owner-side key columns.
    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

/// Builder for [`AssociationKeyMetadata`].
#[derive(Debug, Clone)]
pub struct AssociationKeyMetadataBuilder {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_column_names: Vec<String>,
    kind: AssociationKind,
    associated_entity: Option<EntityKeyMetadata>,
    collection_role: String,
    inverse: bool,
}

impl AssociationKeyMetadataBuilder {
    fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column_names: Vec::new(),
            row_key_column_names: Vec::new(),
            row_key_index_column_names: Vec::new(),
            kind: AssociationKind::OneToMany,
            associated_entity: None,
            collection_role: String::new(),
            inverse: false,
        }
    }

    /// Sets the owner-side columns.
    #[must_use]
    pub fn column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the row key columns.
    #[must_use]
    pub fn row_key_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row_key_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the row key index columns.
    #[must_use]
    pub fn row_key_index_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row_key_index_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the association kind.
    #[must_use]
    pub fn kind(mut self, kind: AssociationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the associated entity metadata.
    #[must_use]
    pub fn associated_entity(mut self, metadata: EntityKeyMetadata) -> Self {
        self.associated_entity = Some(metadata);
        self
    }

    /// Sets the collection role.
    #[must_use]
    pub fn collection_role(mut self, role: impl Into<String>) -> Self {
        self.collection_role = role.into();
        self
    }

    /// Marks this side as the inverse side.
    #[must_use]
    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    /// Builds the metadata.
    pub fn build(self) -> AssociationKeyMetadata {
        AssociationKeyMetadata {
            table: Arc::from(self.table),
            column_names: self.column_names.into(),
            row_key_column_names: self.row_key_column_names.into(),
            row_key_index_column_names: self.row_key_index_column_names.into(),
            kind: self.kind,
            associated_entity: self.associated_entity,
            collection_role: Arc::from(self.collection_role),
            inverse: self.inverse,
        }
    }
}

/// Identifies the row set of one association instance.
///
/// Equality covers the metadata and the selecting column values. The owning
/// entity key is carried for dialects that embed associations in the owner's
/// document; it is derived from the same values and does not take part in
/// equality.
#[derive(Debug, Clone)]
pub struct AssociationKey {
    metadata: AssociationKeyMetadata,
    column_values: Arc<[Value]>,
    owner: EntityKey,
}

impl AssociationKey {
    /// Creates an association key.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the number of owner columns.
    pub fn new(
        metadata: AssociationKeyMetadata,
        column_values: impl Into<Vec<Value>>,
        owner: EntityKey,
    ) -> Self {
        let column_values: Vec<Value> = column_values.into();
        assert_eq!(
            metadata.column_names.len(),
            column_values.len(),
            "association key for {} expects {} values",
            metadata.table,
            metadata.column_names.len()
        );
        Self {
            metadata,
            column_values: column_values.into(),
            owner,
        }
    }

    /// Returns the metadata.
    pub fn metadata(&self) -> &AssociationKeyMetadata {
        &self.metadata
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    /// Returns the owner-side column names.
    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    /// Returns the owner-side column values.
    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Returns the owning entity key.
    pub fn entity_key(&self) -> &EntityKey {
        &self.owner
    }

    /// Returns the value of an owner-side column.
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.column_names()
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }
}

impl PartialEq for AssociationKey {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.column_values == other.column_values
    }
}

impl Eq for AssociationKey {}

impl std::hash::Hash for AssociationKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.metadata.hash(state);
        self.column_values.hash(state);
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssociationKey({}", self.table())?;
        write_columns(f, self.column_names(), &self.column_values)?;
        f.write_str(")")
    }
}

/// Identifies one row inside an association.
///
/// Row keys order by table, then column names, then values, which gives
/// dialects a deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    table: Arc<str>,
    column_names: Arc<[String]>,
    column_values: Arc<[Value]>,
}

impl RowKey {
    /// Creates a row key.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the number of columns.
    pub fn new<I, S>(table: impl Into<String>, column_names: I, column_values: impl Into<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column_names = shared_names(column_names);
        let column_values: Vec<Value> = column_values.into();
        assert_eq!(
            column_names.len(),
            column_values.len(),
            "row key column names and values differ in length"
        );
        Self {
            table: Arc::from(table.into()),
            column_names,
            column_values: column_values.into(),
        }
    }

    /// Returns the association table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the row key column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Returns the row key column values.
    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Returns the value of a row key column.
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    /// Whether `column` is part of this row key.
    pub fn contains(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({}", self.table)?;
        write_columns(f, &self.column_names, &self.column_values)?;
        f.write_str(")")
    }
}

/// How an identifier source is materialised in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSourceType {
    /// A row in a shared generator table, defined lazily at first use.
    Table,
    /// A named sequence, defined at schema initialisation.
    Sequence,
}

/// Static description of an identifier source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdSourceKeyMetadata {
    kind: IdSourceType,
    name: Arc<str>,
    key_column_name: Arc<str>,
    value_column_name: Arc<str>,
}

impl IdSourceKeyMetadata {
    /// Metadata for a table-based generator.
    pub fn for_table(
        table: impl Into<String>,
        key_column_name: impl Into<String>,
        value_column_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: IdSourceType::Table,
            name: Arc::from(table.into()),
            key_column_name: Arc::from(key_column_name.into()),
            value_column_name: Arc::from(value_column_name.into()),
        }
    }

    /// Metadata for a sequence.
    pub fn for_sequence(name: impl Into<String>) -> Self {
        Self {
            kind: IdSourceType::Sequence,
            name: Arc::from(name.into()),
            key_column_name: Arc::from("sequence_name"),
            value_column_name: Arc::from("next_val"),
        }
    }

    /// Returns the id source type.
    pub fn kind(&self) -> IdSourceType {
        self.kind
    }

    /// Returns the table or sequence name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the segment column name.
    pub fn key_column_name(&self) -> &str {
        &self.key_column_name
    }

    /// Returns the value column name.
    pub fn value_column_name(&self) -> &str {
        &self.value_column_name
    }
}

/// Identifies one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdSourceKey {
    metadata: IdSourceKeyMetadata,
    segment_value: Arc<str>,
}

impl IdSourceKey {
    /// Key of the segment `segment_value` inside a generator table.
    pub fn for_table(metadata: IdSourceKeyMetadata, segment_value: impl Into<String>) -> Self {
        Self {
            metadata,
            segment_value: Arc::from(segment_value.into()),
        }
    }

    /// Key of a named sequence.
    pub fn for_sequence(metadata: IdSourceKeyMetadata) -> Self {
        let segment_value = Arc::clone(&metadata.name);
        Self {
            metadata,
            segment_value,
        }
    }

    /// Returns the metadata.
    pub fn metadata(&self) -> &IdSourceKeyMetadata {
        &self.metadata
    }

    /// Returns the generator table or sequence name.
    pub fn table(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the segment value identifying the counter.
    pub fn segment_value(&self) -> &str {
        &self.segment_value
    }
}

impl fmt::Display for IdSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdSourceKey({}[{}])", self.table(), self.segment_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn shipment_key(id: &str) -> EntityKey {
        EntityKey::new(
            EntityKeyMetadata::new("Shipment", ["id"]),
            vec![Value::from(id)],
        )
    }

    #[test]
    fn entity_keys_with_same_parts_are_equal() {
        let a = shipment_key("shipment-1");
        let b = shipment_key("shipment-1");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn entity_keys_differing_in_any_part_are_not_equal() {
        let base = shipment_key("shipment-1");
        assert_ne!(base, shipment_key("shipment-2"));

        let other_table = EntityKey::new(
            EntityKeyMetadata::new("Order", ["id"]),
            vec![Value::from("shipment-1")],
        );
        assert_ne!(base, other_table);

        let other_column = EntityKey::new(
            EntityKeyMetadata::new("Shipment", ["code"]),
            vec![Value::from("shipment-1")],
        );
        assert_ne!(base, other_column);
    }

    #[test]
    #[should_panic(expected = "expects 2 values")]
    fn entity_key_rejects_mismatched_lengths() {
        let _ = EntityKey::new(
            EntityKeyMetadata::new("Line", ["order_id", "position"]),
            vec![Value::Integer(1)],
        );
    }

    #[test]
    fn entity_key_column_lookup() {
        let key = EntityKey::new(
            EntityKeyMetadata::new("Line", ["order_id", "position"]),
            vec![Value::Integer(7), Value::Integer(2)],
        );
        assert_eq!(key.column_value("position"), Some(&Value::Integer(2)));
        assert_eq!(key.column_value("missing"), None);
        assert_eq!(key.to_string(), "EntityKey(Line[order_id=7, position=2])");
    }

    #[test]
    fn association_key_equality_ignores_owner_instance() {
        let metadata = AssociationKeyMetadata::builder("Order_lines")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "line_id"])
            .kind(AssociationKind::OneToMany)
            .collection_role("lines")
            .build();
        let owner = EntityKey::new(
            EntityKeyMetadata::new("Order", ["id"]),
            vec![Value::Integer(1)],
        );
        let a = AssociationKey::new(metadata.clone(), vec![Value::Integer(1)], owner.clone());
        let b = AssociationKey::new(metadata, vec![Value::Integer(1)], owner);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn row_keys_compare_structurally() {
        let a = RowKey::new("Order_lines", ["order_id", "line_id"], vec![Value::Integer(1), Value::Integer(2)]);
        let b = RowKey::new("Order_lines", ["order_id", "line_id"], vec![Value::Integer(1), Value::Integer(2)]);
        let c = RowKey::new("Order_lines", ["order_id", "line_id"], vec![Value::Integer(1), Value::Integer(3)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.contains("line_id"));
        assert_eq!(a.column_value("line_id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn id_source_keys() {
        let table = IdSourceKeyMetadata::for_table("hibernate_sequences", "sequence_name", "next_val");
        let key = IdSourceKey::for_table(table.clone(), "Shipment");
        assert_eq!(key.table(), "hibernate_sequences");
        assert_eq!(key.segment_value(), "Shipment");
        assert_eq!(key.metadata().kind(), IdSourceType::Table);

        let seq = IdSourceKey::for_sequence(IdSourceKeyMetadata::for_sequence("order_seq"));
        assert_eq!(seq.segment_value(), "order_seq");
        assert_eq!(seq.metadata().kind(), IdSourceType::Sequence);
        assert_ne!(key, IdSourceKey::for_table(table, "Order"));
    }
}
