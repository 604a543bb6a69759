//! Identifier generation.

use crate::error::{GridError, GridResult};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tuplegrid_model::{IdSourceKey, IdSourceKeyMetadata, IdSourceType};

/// A request for the next value of a sequence or table generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextValueRequest {
    /// Generator key.
    pub key: IdSourceKey,
    /// Step between consecutive values.
    pub increment: i64,
    /// Value returned by the first call on a fresh generator.
    pub initial_value: i64,
}

impl NextValueRequest {
    /// Creates a request.
    pub fn new(key: IdSourceKey, increment: i64, initial_value: i64) -> Self {
        Self {
            key,
            increment,
            initial_value,
        }
    }
}

/// A sequence to create when the schema is initialised.
///
/// Table generators need no definition: their rows appear on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDefinition {
    /// Sequence metadata; its kind must be [`IdSourceType::Sequence`].
    pub metadata: IdSourceKeyMetadata,
    /// Value returned by the first `next_value` call.
    pub initial_value: i64,
}

impl SequenceDefinition {
    /// Defines sequence `metadata` starting at `initial_value`.
    pub fn new(metadata: IdSourceKeyMetadata, initial_value: i64) -> Self {
        Self {
            metadata,
            initial_value,
        }
    }

    /// Key the sequence's values are drawn under.
    pub fn key(&self) -> IdSourceKey {
        IdSourceKey::for_sequence(self.metadata.clone())
    }
}

/// Named counters with read-increment-return-previous semantics.
///
/// Counters are created lazily or by [`AtomicCounters::define`]. When two
/// callers race to create the same counter, one creation wins and both then increment it, so with an initial
/// value of 0 and an increment of 1, N callers observe exactly `0..N`.
#[derive(Debug)]
pub struct AtomicCounters<K: Eq + Hash> {
    counters: DashMap<K, Arc<AtomicI64>>,
}

impl<K: Eq + Hash> Default for AtomicCounters<K> {
    fn default() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> AtomicCounters<K> {
    /// Creates an empty set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `key` at `initial_value` unless it already exists.
    ///
    /// Returns whether the counter was created.
    pub fn define(&self, key: K, initial_value: i64) -> bool {
        let mut created = false;
        self.counters.entry(key).or_insert_with(|| {
            created = true;
            Arc::new(AtomicI64::new(initial_value))
        });
        created
    }

    /// Returns the current value of `key` and advances it by `increment`.
    ///
    /// A missing counter is defined as `initial_value` first.
    pub fn next_value(&self, key: &K, initial_value: i64, increment: i64) -> GridResult<i64> {
        let counter = match self.counters.get(key) {
            Some(counter) => Arc::clone(counter.value()),
            None => Arc::clone(
                self.counters
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AtomicI64::new(initial_value)))
                    .value(),
            ),
        };
        advance(&counter, increment)
    }

    /// Serves `request` from the counter stored under `key`.
    ///
    /// Table generators are defined on first use. Sequences must have been
    /// defined beforehand.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an undefined sequence or on overflow.
    pub fn next_value_for(&self, key: &K, request: &NextValueRequest) -> GridResult<i64> {
        match request.key.metadata().kind() {
            IdSourceType::Table => self.next_value(key, request.initial_value, request.increment),
            IdSourceType::Sequence => {
                let counter = self
                    .counters
                    .get(key)
                    .map(|counter| Arc::clone(counter.value()))
                    .ok_or_else(|| {
                        GridError::invalid_operation(format!(
                            "sequence {} is not defined",
                            request.key.table()
                        ))
                    })?;
                advance(&counter, request.increment)
            }
        }
    }

    /// Returns the value the next call would return, if the counter exists.
    pub fn peek(&self, key: &K) -> Option<i64> {
        self.counters
            .get(key)
            .map(|counter| counter.value().load(Ordering::SeqCst))
    }

    /// Number of defined counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counter has been defined.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

fn advance(counter: &AtomicI64, increment: i64) -> GridResult<i64> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            current.checked_add(increment)
        })
        .map_err(|current| {
            GridError::invalid_operation(format!(
                "generator overflow at {current} with increment {increment}"
            ))
        })
}
