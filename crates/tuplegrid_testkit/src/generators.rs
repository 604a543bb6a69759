//! Property-based test generators using proptest.
//!
//! Provides strategies for generating column edits and association row
//! edits, plus reference models of what those edits should leave behind.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tuplegrid_model::{Association, RowKey, Tuple, Value};

/// Strategy for generating column names from a small alphabet, so edits
/// collide often.
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]").expect("Invalid regex")
}

/// Strategy for generating column values, nulls included.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        2 => any::<bool>().prop_map(Value::Bool),
        4 => any::<i64>().prop_map(Value::Integer),
        3 => prop::string::string_regex("[a-z]{0,8}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating a loaded column map.
pub fn column_map_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(column_name_strategy(), value_strategy(), 0..4)
}

/// One edit of a tuple column.
#[derive(Debug, Clone)]
pub enum ColumnEdit {
    /// Put a value
    Put {
        /// Column name
        column: String,
        /// New value
        value: Value,
    },
    /// Remove the column
    Remove {
        /// Column name
        column: String,
    },
}

/// Strategy for generating column edits.
pub fn column_edit_strategy() -> impl Strategy<Value = ColumnEdit> {
    prop_oneof![
        3 => (column_name_strategy(), value_strategy())
            .prop_map(|(column, value)| ColumnEdit::Put { column, value }),
        2 => column_name_strategy().prop_map(|column| ColumnEdit::Remove { column }),
    ]
}

/// Strategy for generating a sequence of column edits.
pub fn column_edit_sequence_strategy(
    min_edits: usize,
    max_edits: usize,
) -> impl Strategy<Value = Vec<ColumnEdit>> {
    prop::collection::vec(column_edit_strategy(), min_edits..max_edits)
}

/// Applies `edits` to `tuple` in order.
pub fn apply_column_edits(tuple: &mut Tuple, edits: &[ColumnEdit]) {
    for edit in edits {
        match edit {
            ColumnEdit::Put { column, value } => tuple.put(column.as_str(), value.clone()),
            ColumnEdit::Remove { column } => tuple.remove(column.as_str()),
        }
    }
}

/// Columns expected after `edits` on a tuple loaded with `loaded`.
pub fn expected_columns(
    loaded: &BTreeMap<String, Value>,
    edits: &[ColumnEdit],
) -> BTreeMap<String, Value> {
    let mut columns = loaded.clone();
    for edit in edits {
        match edit {
            ColumnEdit::Put { column, value } => {
                columns.insert(column.clone(), value.clone());
            }
            ColumnEdit::Remove { column } => {
                columns.remove(column);
            }
        }
    }
    columns
}

/// One edit of an association.
#[derive(Debug, Clone, Copy)]
pub enum RowEdit {
    /// Put the row with this index
    Put(i64),
    /// Remove the row with this index
    Remove(i64),
    /// Remove every row
    Clear,
}

/// Strategy for generating association edits over a few row indexes.
pub fn row_edit_strategy() -> impl Strategy<Value = RowEdit> {
    prop_oneof![
        6 => (0i64..6).prop_map(RowEdit::Put),
        4 => (0i64..6).prop_map(RowEdit::Remove),
        1 => Just(RowEdit::Clear),
    ]
}

/// Strategy for generating a sequence of association edits.
pub fn row_edit_sequence_strategy(
    min_edits: usize,
    max_edits: usize,
) -> impl Strategy<Value = Vec<RowEdit>> {
    prop::collection::vec(row_edit_strategy(), min_edits..max_edits)
}

/// Row key of row `index` in the fixture association table.
pub fn row_key(index: i64) -> RowKey {
    RowKey::new(
        "Shipment_items",
        ["shipment_id", "position"],
        vec![Value::Integer(1), Value::Integer(index)],
    )
}

/// Applies `edits` to `association` in order.
pub fn apply_row_edits(association: &mut Association, edits: &[RowEdit]) {
    for edit in edits {
        match *edit {
            RowEdit::Put(index) => {
                let mut row = Tuple::new();
                row.put("position", index);
                association.put(row_key(index), row);
            }
            RowEdit::Remove(index) => association.remove(&row_key(index)),
            RowEdit::Clear => association.clear(),
        }
    }
}

/// Row indexes expected after `edits` on an association loaded with `loaded`.
pub fn expected_rows(loaded: &BTreeSet<i64>, edits: &[RowEdit]) -> BTreeSet<i64> {
    let mut rows = loaded.clone();
    for edit in edits {
        match *edit {
            RowEdit::Put(index) => {
                rows.insert(index);
            }
            RowEdit::Remove(index) => {
                rows.remove(&index);
            }
            RowEdit::Clear => rows.clear(),
        }
    }
    rows
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
