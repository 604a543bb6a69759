//! Identifiers of units of work.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one unit of work (a flush cycle and its transaction).
///
/// Shows up in rollback and failure contexts so that a handler can tell
/// reports from concurrent sessions apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uow-{}", self.0)
    }
}

/// Hands out increasing [`TransactionId`]s, starting at 1.
#[derive(Debug)]
pub(crate) struct TransactionIds {
    next: AtomicU64,
}

impl TransactionIds {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn allocate(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_from_one() {
        let ids = TransactionIds::new();
        assert_eq!(ids.allocate(), TransactionId::new(1));
        assert_eq!(ids.allocate(), TransactionId::new(2));
        assert!(ids.allocate() > TransactionId::new(2));
    }

    #[test]
    fn display_names_the_unit_of_work() {
        assert_eq!(TransactionId::new(42).to_string(), "uow-42");
    }
}
