//! Change-tracked view over one entity's persisted columns.

use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// The last-known state of a tuple as read from the store.
///
/// Snapshots are read-only. Dialects implement this over their native
/// representation (a document, a node's properties, a cache entry).
pub trait TupleSnapshot: fmt::Debug + Send + Sync {
    /// Returns the stored value of `column`, if present.
    fn get(&self, column: &str) -> Option<Value>;

    /// Whether the snapshot holds no columns.
    fn is_empty(&self) -> bool;

    /// Returns the stored column names.
    fn column_names(&self) -> BTreeSet<String>;
}

/// Snapshot with no columns, used for tuples of new entities.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyTupleSnapshot;

impl TupleSnapshot for EmptyTupleSnapshot {
    fn get(&self, _column: &str) -> Option<Value> {
        None
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn column_names(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Snapshot over an owned column map.
///
/// The map is copied out of the store, so the snapshot never observes
/// later writes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapTupleSnapshot {
    columns: BTreeMap<String, Value>,
}

impl MapTupleSnapshot {
    /// Creates a snapshot over `columns`.
    pub fn new(columns: BTreeMap<String, Value>) -> Self {
        Self { columns }
    }

    /// Returns the underlying columns.
    pub fn columns(&self) -> &BTreeMap<String, Value> {
        &self.columns
    }
}

impl TupleSnapshot for MapTupleSnapshot {
    fn get(&self, column: &str) -> Option<Value> {
        self.columns.get(column).cloned()
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn column_names(&self) -> BTreeSet<String> {
        self.columns.keys().cloned().collect()
    }
}

/// How the snapshot behind a tuple came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotType {
    /// The tuple belongs to an entity that is being inserted.
    Insert,
    /// The tuple was loaded from the store.
    Update,
    /// Origin not known (e.g. tuples built by hand).
    Unknown,
}

/// One recorded change to a tuple column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleOperation {
    /// Set a column to a non-null value.
    Put {
        /// Column name.
        column: String,
        /// New value.
        value: Value,
    },
    /// Set a column to null; the column stays present.
    PutNull {
        /// Column name.
        column: String,
    },
    /// Remove the column entirely.
    Remove {
        /// Column name.
        column: String,
    },
}

impl TupleOperation {
    /// Returns the column this operation touches.
    pub fn column(&self) -> &str {
        match self {
            TupleOperation::Put { column, .. }
            | TupleOperation::PutNull { column }
            | TupleOperation::Remove { column } => column,
        }
    }
}

/// One entity's persistent state: a snapshot plus the changes logged on top.
///
/// `get` replays the log in insertion order; the latest operation on a column
/// wins, so put-then-remove nets to removed.
#[derive(Debug, Clone)]
pub struct Tuple {
    snapshot: Arc<dyn TupleSnapshot>,
    snapshot_type: SnapshotType,
    log: Vec<TupleOperation>,
}

impl Default for Tuple {
    fn default() -> Self {
        Self::new()
    }
}

impl Tuple {
    /// Creates an empty tuple of unknown origin.
    pub fn new() -> Self {
        Self::with_snapshot(Arc::new(EmptyTupleSnapshot), SnapshotType::Unknown)
    }

    /// Creates a tuple over an existing snapshot.
    pub fn with_snapshot(snapshot: Arc<dyn TupleSnapshot>, snapshot_type: SnapshotType) -> Self {
        Self {
            snapshot,
            snapshot_type,
            log: Vec::new(),
        }
    }

    /// Creates a tuple over a copied column map.
    pub fn from_columns(columns: BTreeMap<String, Value>, snapshot_type: SnapshotType) -> Self {
        Self::with_snapshot(Arc::new(MapTupleSnapshot::new(columns)), snapshot_type)
    }

    /// Returns the effective value of `column`.
    ///
    /// A column that was set to null returns `Some(Value::Null)`.
    pub fn get(&self, column: &str) -> Option<Value> {
        match self.log.iter().rev().find(|op| op.column() == column) {
            Some(TupleOperation::Put { value, .. }) => Some(value.clone()),
            Some(TupleOperation::PutNull { .. }) => Some(Value::Null),
            Some(TupleOperation::Remove { .. }) => None,
            None => self.snapshot.get(column),
        }
    }

    /// Records a put. Passing [`Value::Null`] records a put-null.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if value.is_null() {
            self.log.push(TupleOperation::PutNull { column });
        } else {
            self.log.push(TupleOperation::Put { column, value });
        }
    }

    /// Records the removal of `column`.
    pub fn remove(&mut self, column: impl Into<String>) {
        self.log.push(TupleOperation::Remove {
            column: column.into(),
        });
    }

    /// Returns the effective column names.
    ///
    /// Snapshot columns plus net-put columns, minus net-removed columns.
    pub fn column_names(&self) -> BTreeSet<String> {
        let mut names = self.snapshot.column_names();
        for op in self.operations() {
            match op {
                TupleOperation::Put { column, .. } | TupleOperation::PutNull { column } => {
                    names.insert(column);
                }
                TupleOperation::Remove { column } => {
                    names.remove(&column);
                }
            }
        }
        names
    }

    /// Returns the net operation per column, in first-touch order.
    ///
    /// This is the delta a dialect applies on flush.
    pub fn operations(&self) -> Vec<TupleOperation> {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut net: Vec<TupleOperation> = Vec::new();
        for op in &self.log {
            match slots.get(op.column()) {
                Some(&i) => net[i] = op.clone(),
                None => {
                    slots.insert(op.column(), net.len());
                    net.push(op.clone());
                }
            }
        }
        net
    }

    /// Whether any change was recorded since the snapshot.
    pub fn has_changes(&self) -> bool {
        !self.log.is_empty()
    }

    /// Whether the tuple has no effective columns.
    pub fn is_empty(&self) -> bool {
        self.column_names().is_empty()
    }

    /// Returns the snapshot behind this tuple.
    pub fn snapshot(&self) -> &Arc<dyn TupleSnapshot> {
        &self.snapshot
    }

    /// Returns how the snapshot came to be.
    pub fn snapshot_type(&self) -> SnapshotType {
        self.snapshot_type
    }

    /// Overrides the snapshot type.
    pub fn set_snapshot_type(&mut self, snapshot_type: SnapshotType) {
        self.snapshot_type = snapshot_type;
    }

    /// Materialises the effective state as a column map.
    pub fn to_column_map(&self) -> BTreeMap<String, Value> {
        self.column_names()
            .into_iter()
            .filter_map(|column| self.get(&column).map(|value| (column, value)))
            .collect()
    }

    /// Folds the log into a fresh snapshot and returns the result.
    ///
    /// Dialects call this after a successful write so that re-applying the
    /// same tuple is a no-op.
    pub fn into_applied(self) -> Tuple {
        let columns = self.to_column_map();
        Tuple::from_columns(columns, SnapshotType::Update)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.to_column_map() == other.to_column_map()
    }
}

/// Mutable slot holding a tuple across dialect calls.
///
/// Dialects may replace the tuple after a write (for instance with one
/// whose snapshot reflects the stored state).
#[derive(Debug, Clone, Default)]
pub struct TuplePointer {
    tuple: Tuple,
}

impl TuplePointer {
    /// Wraps a tuple.
    pub fn new(tuple: Tuple) -> Self {
        Self { tuple }
    }

    /// Returns the current tuple.
    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }

    /// Returns the current tuple mutably.
    pub fn tuple_mut(&mut self) -> &mut Tuple {
        &mut self.tuple
    }

    /// Replaces the tuple.
    pub fn set_tuple(&mut self, tuple: Tuple) {
        self.tuple = tuple;
    }

    /// Unwraps the tuple.
    pub fn into_tuple(self) -> Tuple {
        self.tuple
    }
}

impl From<Tuple> for TuplePointer {
    fn from(tuple: Tuple) -> Self {
        Self::new(tuple)
    }
}
