//! Resolution of entity property paths to physical columns.

use crate::error::{QueryError, QueryResult};
use std::collections::HashMap;
use std::fmt;
use tuplegrid_model::Value;

/// A dotted property path as written in the host query (`author.name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    /// Parses a dotted path.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the dotted form.
    pub fn as_dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_dotted())
    }
}

impl From<&str> for PropertyPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for PropertyPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

/// A property resolved to its stored column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Physical column name.
    pub name: String,
    /// Whether the column is part of the entity id.
    pub is_id: bool,
    /// Whether the id has more than one column.
    pub composite_id: bool,
}

impl Column {
    /// A plain (non-id) column.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_id: false,
            composite_id: false,
        }
    }
}

/// Restriction added for entities sharing a table with other subtypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    /// Discriminator column name.
    pub column: String,
    /// Accepted values; more than one for a type with subtypes.
    pub values: Vec<Value>,
}

/// Maps entity names and property paths to tables and columns.
pub trait PropertyHelper: Send + Sync {
    /// Returns the table the entity is stored in.
    fn table(&self, entity: &str) -> QueryResult<String>;

    /// Resolves a property path of `entity`.
    fn column(&self, entity: &str, path: &PropertyPath) -> QueryResult<Column>;

    /// Returns the discriminator restriction of `entity`, if any.
    fn discriminator(&self, _entity: &str) -> Option<Discriminator> {
        None
    }
}

/// Column mapping of one entity type.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    entity: String,
    table: String,
    id_columns: Vec<String>,
    properties: HashMap<String, String>,
    discriminator: Option<Discriminator>,
}

impl EntityMapping {
    /// Starts a mapping for `entity`, stored in a table of the same name.
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            table: entity.clone(),
            entity,
            id_columns: vec!["id".to_string()],
            properties: HashMap::new(),
            discriminator: None,
        }
    }

    /// Sets the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the id columns. Defaults to `["id"]`.
    #[must_use]
    pub fn id_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Maps a property path to a column with a different name.
    ///
    /// Unmapped properties are stored under their dotted path.
    #[must_use]
    pub fn property(mut self, path: impl Into<String>, column: impl Into<String>) -> Self {
        self.properties.insert(path.into(), column.into());
        self
    }

    /// Restricts the entity to rows whose `column` holds one of `values`.
    #[must_use]
    pub fn discriminator<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.discriminator = Some(Discriminator {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Returns the entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    fn resolve(&self, path: &PropertyPath) -> Column {
        let dotted = path.as_dotted();
        let name = self.properties.get(&dotted).cloned().unwrap_or(dotted);
        let is_id = self.id_columns.iter().any(|c| *c == name);
        Column {
            name,
            is_id,
            composite_id: is_id && self.id_columns.len() > 1,
        }
    }
}

/// A set of entity mappings, used as the [`PropertyHelper`] of a session.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: HashMap<String, EntityMapping>,
}

impl MappingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping, replacing any mapping of the same entity.
    #[must_use]
    pub fn with(mut self, mapping: EntityMapping) -> Self {
        self.register(mapping);
        self
    }

    /// Adds a mapping in place.
    pub fn register(&mut self, mapping: EntityMapping) {
        self.mappings.insert(mapping.entity.clone(), mapping);
    }

    fn mapping(&self, entity: &str) -> QueryResult<&EntityMapping> {
        self.mappings
            .get(entity)
            .ok_or_else(|| QueryError::unknown_entity(entity))
    }
}

impl PropertyHelper for MappingRegistry {
    fn table(&self, entity: &str) -> QueryResult<String> {
        Ok(self.mapping(entity)?.table.clone())
    }

    fn column(&self, entity: &str, path: &PropertyPath) -> QueryResult<Column> {
        Ok(self.mapping(entity)?.resolve(path))
    }

    fn discriminator(&self, entity: &str) -> Option<Discriminator> {
        self.mappings
            .get(entity)
            .and_then(|m| m.discriminator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MappingRegistry {
        MappingRegistry::new()
            .with(EntityMapping::new("IndexedEntity").property("name", "entityName"))
            .with(
                EntityMapping::new("Line")
                    .table("Order_Line")
                    .id_columns(["order_id", "position"]),
            )
    }

    #[test]
    fn renamed_and_default_columns() {
        let helper = registry();
        let name = helper
            .column("IndexedEntity", &PropertyPath::parse("name"))
            .unwrap();
        assert_eq!(name, Column::plain("entityName"));
        let nested = helper
            .column("IndexedEntity", &PropertyPath::parse("author.name"))
            .unwrap();
        assert_eq!(nested.name, "author.name");
    }

    #[test]
    fn id_columns_are_flagged() {
        let helper = registry();
        let id = helper
            .column("IndexedEntity", &PropertyPath::parse("id"))
            .unwrap();
        assert!(id.is_id);
        assert!(!id.composite_id);
        let position = helper
            .column("Line", &PropertyPath::parse("position"))
            .unwrap();
        assert!(position.composite_id);
        assert_eq!(helper.table("Line").unwrap(), "Order_Line");
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let err = registry().table("Nope").unwrap_err();
        assert_eq!(err, QueryError::unknown_entity("Nope"));
    }
}
