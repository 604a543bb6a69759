//! Change-tracked collection of rows owned by an association key.

use crate::key::RowKey;
use crate::tuple::Tuple;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Last-known rows of an association as read from the store.
pub trait AssociationSnapshot: fmt::Debug + Send + Sync {
    /// Whether the snapshot contains a row under `key`.
    fn contains_key(&self, key: &RowKey) -> bool;

    /// Returns the row stored under `key`.
    fn get(&self, key: &RowKey) -> Option<Tuple>;

    /// Number of rows.
    fn size(&self) -> usize;

    /// Row keys in the snapshot's iteration order.
    fn row_keys(&self) -> Vec<RowKey>;
}

/// Snapshot over rows held in memory, keeping their load order.
#[derive(Debug, Default, Clone)]
pub struct MapAssociationSnapshot {
    rows: Vec<(RowKey, Tuple)>,
}

impl MapAssociationSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a snapshot from rows in load order.
    ///
    /// A later row with the same key replaces the earlier one in place.
    pub fn from_rows(rows: impl IntoIterator<Item = (RowKey, Tuple)>) -> Self {
        let mut snapshot = Self::new();
        for (key, tuple) in rows {
            match snapshot.rows.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = tuple,
                None => snapshot.rows.push((key, tuple)),
            }
        }
        snapshot
    }
}

impl AssociationSnapshot for MapAssociationSnapshot {
    fn contains_key(&self, key: &RowKey) -> bool {
        self.rows.iter().any(|(k, _)| k == key)
    }

    fn get(&self, key: &RowKey) -> Option<Tuple> {
        self.rows
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, t)| t.clone())
    }

    fn size(&self) -> usize {
        self.rows.len()
    }

    fn row_keys(&self) -> Vec<RowKey> {
        self.rows.iter().map(|(k, _)| k.clone()).collect()
    }
}

/// One recorded change to an association.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationOperation {
    /// Insert or replace a row.
    PutRow {
        /// Row key.
        key: RowKey,
        /// Row value.
        value: Tuple,
    },
    /// Remove a row.
    RemoveRow {
        /// Row key.
        key: RowKey,
    },
    /// Drop every row, including snapshot rows.
    Clear,
}

/// A collection of rows keyed by [`RowKey`], layered over a snapshot.
#[derive(Debug, Clone)]
pub struct Association {
    snapshot: Arc<dyn AssociationSnapshot>,
    cleared: bool,
    changes: BTreeMap<RowKey, Option<Tuple>>,
    change_order: Vec<RowKey>,
    added_order: Vec<RowKey>,
}

impl Default for Association {
    fn default() -> Self {
        Self::new()
    }
}

impl Association {
    /// Creates an empty association.
    pub fn new() -> Self {
        Self::with_snapshot(Arc::new(MapAssociationSnapshot::new()))
    }

    /// Creates an association over a loaded snapshot.
    pub fn with_snapshot(snapshot: Arc<dyn AssociationSnapshot>) -> Self {
        Self {
            snapshot,
            cleared: false,
            changes: BTreeMap::new(),
            change_order: Vec::new(),
            added_order: Vec::new(),
        }
    }

    /// Returns the effective row under `key`.
    pub fn get(&self, key: &RowKey) -> Option<Tuple> {
        match self.changes.get(key) {
            Some(change) => change.clone(),
            None if self.cleared => None,
            None => self.snapshot.get(key),
        }
    }

    /// Puts a row. Re-putting an existing key replaces it in place.
    pub fn put(&mut self, key: RowKey, value: Tuple) {
        if !self.in_snapshot(&key) && !self.added_order.contains(&key) {
            self.added_order.push(key.clone());
        }
        self.record(key, Some(value));
    }

    /// Removes a row.
    pub fn remove(&mut self, key: &RowKey) {
        self.added_order.retain(|k| k != key);
        if self.in_snapshot(key) {
            self.record(key.clone(), None);
        } else if self.changes.remove(key).is_some() {
            self.change_order.retain(|k| k != key);
        }
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.cleared = true;
        self.changes.clear();
        self.change_order.clear();
        self.added_order.clear();
    }

    /// Whether a row under `key` is effectively present.
    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.get(key).is_some()
    }

    /// Effective row keys: surviving snapshot keys in snapshot order, then
    /// added keys in insertion order.
    pub fn row_keys(&self) -> Vec<RowKey> {
        let mut keys: Vec<RowKey> = if self.cleared {
            Vec::new()
        } else {
            self.snapshot
                .row_keys()
                .into_iter()
                .filter(|k| !matches!(self.changes.get(k), Some(None)))
                .collect()
        };
        keys.extend(self.added_order.iter().cloned());
        keys
    }

    /// Effective number of rows.
    pub fn size(&self) -> usize {
        self.row_keys().len()
    }

    /// Whether the association has no effective rows.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the effective rows in [`Association::row_keys`] order.
    pub fn rows(&self) -> Vec<(RowKey, Tuple)> {
        self.row_keys()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|t| (k, t)))
            .collect()
    }

    /// Returns the net operation per row, in first-touch order.
    ///
    /// A clear comes first when the snapshot was dropped.
    pub fn operations(&self) -> Vec<AssociationOperation> {
        let mut ops = Vec::new();
        if self.cleared {
            ops.push(AssociationOperation::Clear);
        }
        for key in &self.change_order {
            ops.push(match self.changes.get(key) {
                Some(Some(value)) => AssociationOperation::PutRow {
                    key: key.clone(),
                    value: value.clone(),
                },
                _ => AssociationOperation::RemoveRow { key: key.clone() },
            });
        }
        ops
    }

    /// Whether any change was recorded since the snapshot.
    pub fn has_changes(&self) -> bool {
        self.cleared || !self.changes.is_empty()
    }

    /// Returns the snapshot behind this association.
    pub fn snapshot(&self) -> &Arc<dyn AssociationSnapshot> {
        &self.snapshot
    }

    /// Folds recorded changes into a fresh snapshot.
    pub fn into_applied(self) -> Association {
        Association::with_snapshot(Arc::new(MapAssociationSnapshot::from_rows(self.rows())))
    }

    fn record(&mut self, key: RowKey, change: Option<Tuple>) {
        if self.changes.insert(key.clone(), change).is_none() {
            self.change_order.push(key);
        }
    }

    fn in_snapshot(&self, key: &RowKey) -> bool {
        !self.cleared && self.snapshot.contains_key(key)
    }
}
