//! Dialect operations as values: the operation log and the batch queue.

use crate::id::NextValueRequest;
use std::fmt;
use tuplegrid_model::{Association, AssociationKey, EntityKey, Tuple};

/// One dialect invocation, captured with its arguments.
#[derive(Debug, Clone)]
pub enum GridDialectOperation {
    /// Read of one tuple.
    GetTuple {
        /// Requested key.
        key: EntityKey,
    },
    /// Read of several tuples in one round trip.
    GetTuples {
        /// Requested keys.
        keys: Vec<EntityKey>,
    },
    /// Creation of an empty tuple for a new entity.
    CreateTupleWithKey {
        /// New entity key.
        key: EntityKey,
    },
    /// Write of a tuple's changes.
    InsertOrUpdateTuple {
        /// Entity key.
        key: EntityKey,
        /// Tuple as passed to the dialect.
        tuple: Tuple,
    },
    /// Removal of a tuple.
    RemoveTuple {
        /// Entity key.
        key: EntityKey,
    },
    /// Read of an association.
    GetAssociation {
        /// Association key.
        key: AssociationKey,
    },
    /// Creation of an empty association.
    CreateAssociation {
        /// Association key.
        key: AssociationKey,
    },
    /// Write of an association's changes.
    InsertOrUpdateAssociation {
        /// Association key.
        key: AssociationKey,
        /// Association as passed to the dialect.
        association: Association,
    },
    /// Removal of an association.
    RemoveAssociation {
        /// Association key.
        key: AssociationKey,
    },
    /// A group of queued writes applied in one round trip.
    ExecuteBatch {
        /// Writes in the group, in logical order.
        operations: Vec<GridDialectOperation>,
    },
    /// A native query.
    ExecuteBackendQuery {
        /// Queried table.
        table: String,
        /// Rendered native query.
        query: String,
    },
    /// A versioned tuple write.
    UpdateTupleWithOptimisticLock {
        /// Entity key.
        key: EntityKey,
        /// Columns that must still match in the store.
        old_lock_state: Tuple,
        /// New tuple state.
        tuple: Tuple,
    },
    /// A versioned tuple removal.
    RemoveTupleWithOptimisticLock {
        /// Entity key.
        key: EntityKey,
        /// Columns that must still match in the store.
        old_lock_state: Tuple,
    },
    /// A sequence or table generator increment.
    NextValue {
        /// Generator request.
        request: NextValueRequest,
    },
    /// A stored procedure call.
    CallStoredProcedure {
        /// Procedure name.
        name: String,
    },
}

/// Discriminant of a [`GridDialectOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// [`GridDialectOperation::GetTuple`]
    GetTuple,
    /// [`GridDialectOperation::GetTuples`]
    GetTuples,
    /// [`GridDialectOperation::CreateTupleWithKey`]
    CreateTupleWithKey,
    /// [`GridDialectOperation::InsertOrUpdateTuple`]
    InsertOrUpdateTuple,
    /// [`GridDialectOperation::RemoveTuple`]
    RemoveTuple,
    /// [`GridDialectOperation::GetAssociation`]
    GetAssociation,
    /// [`GridDialectOperation::CreateAssociation`]
    CreateAssociation,
    /// [`GridDialectOperation::InsertOrUpdateAssociation`]
    InsertOrUpdateAssociation,
    /// [`GridDialectOperation::RemoveAssociation`]
    RemoveAssociation,
    /// [`GridDialectOperation::ExecuteBatch`]
    ExecuteBatch,
    /// [`GridDialectOperation::ExecuteBackendQuery`]
    ExecuteBackendQuery,
    /// [`GridDialectOperation::UpdateTupleWithOptimisticLock`]
    UpdateTupleWithOptimisticLock,
    /// [`GridDialectOperation::RemoveTupleWithOptimisticLock`]
    RemoveTupleWithOptimisticLock,
    /// [`GridDialectOperation::NextValue`]
    NextValue,
    /// [`GridDialectOperation::CallStoredProcedure`]
    CallStoredProcedure,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetTuple => "getTuple",
            Self::GetTuples => "getTuples",
            Self::CreateTupleWithKey => "createTupleWithKey",
            Self::InsertOrUpdateTuple => "insertOrUpdateTuple",
            Self::RemoveTuple => "removeTuple",
            Self::GetAssociation => "getAssociation",
            Self::CreateAssociation => "createAssociation",
            Self::InsertOrUpdateAssociation => "insertOrUpdateAssociation",
            Self::RemoveAssociation => "removeAssociation",
            Self::ExecuteBatch => "executeBatch",
            Self::ExecuteBackendQuery => "executeBackendQuery",
            Self::UpdateTupleWithOptimisticLock => "updateTupleWithOptimisticLock",
            Self::RemoveTupleWithOptimisticLock => "removeTupleWithOptimisticLock",
            Self::NextValue => "nextValue",
            Self::CallStoredProcedure => "callStoredProcedure",
        };
        f.write_str(name)
    }
}

impl GridDialectOperation {
    /// Returns the kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::GetTuple { .. } => OperationKind::GetTuple,
            Self::GetTuples { .. } => OperationKind::GetTuples,
            Self::CreateTupleWithKey { .. } => OperationKind::CreateTupleWithKey,
            Self::InsertOrUpdateTuple { .. } => OperationKind::InsertOrUpdateTuple,
            Self::RemoveTuple { .. } => OperationKind::RemoveTuple,
            Self::GetAssociation { .. } => OperationKind::GetAssociation,
            Self::CreateAssociation { .. } => OperationKind::CreateAssociation,
            Self::InsertOrUpdateAssociation { .. } => OperationKind::InsertOrUpdateAssociation,
            Self::RemoveAssociation { .. } => OperationKind::RemoveAssociation,
            Self::ExecuteBatch { .. } => OperationKind::ExecuteBatch,
            Self::ExecuteBackendQuery { .. } => OperationKind::ExecuteBackendQuery,
            Self::UpdateTupleWithOptimisticLock { .. } => {
                OperationKind::UpdateTupleWithOptimisticLock
            }
            Self::RemoveTupleWithOptimisticLock { .. } => {
                OperationKind::RemoveTupleWithOptimisticLock
            }
            Self::NextValue { .. } => OperationKind::NextValue,
            Self::CallStoredProcedure { .. } => OperationKind::CallStoredProcedure,
        }
    }

    /// Returns the table the operation touches, if it touches exactly one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::GetTuple { key }
            | Self::CreateTupleWithKey { key }
            | Self::InsertOrUpdateTuple { key, .. }
            | Self::RemoveTuple { key }
            | Self::UpdateTupleWithOptimisticLock { key, .. }
            | Self::RemoveTupleWithOptimisticLock { key, .. } => Some(key.table()),
            Self::GetAssociation { key }
            | Self::CreateAssociation { key }
            | Self::InsertOrUpdateAssociation { key, .. }
            | Self::RemoveAssociation { key } => Some(key.table()),
            Self::ExecuteBackendQuery { table, .. } => Some(table),
            Self::NextValue { request } => Some(request.key.table()),
            Self::GetTuples { .. } | Self::ExecuteBatch { .. } | Self::CallStoredProcedure { .. } => {
                None
            }
        }
    }

    /// Whether the operation is a write that can be deferred to a batch.
    pub fn is_batchable(&self) -> bool {
        matches!(
            self,
            Self::InsertOrUpdateTuple { .. }
                | Self::RemoveTuple { .. }
                | Self::InsertOrUpdateAssociation { .. }
                | Self::RemoveAssociation { .. }
        )
    }
}

/// Ordered log of the operations applied during one flush cycle.
///
/// Discarded on commit; frozen and handed to the error handler on rollback.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    operations: Vec<GridDialectOperation>,
}

impl OperationLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an applied operation.
    pub fn record(&mut self, operation: GridDialectOperation) {
        self.operations.push(operation);
    }

    /// Returns the applied operations in order.
    pub fn operations(&self) -> &[GridDialectOperation] {
        &self.operations
    }

    /// Returns the kinds of the applied operations in order.
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(GridDialectOperation::kind).collect()
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Drops every operation recorded after `mark`.
    pub fn rewind(&mut self, mark: usize) {
        self.operations.truncate(mark);
    }

    /// Empties the log.
    pub fn clear(&mut self) {
        self.operations.clear();
    }
}

/// Writes queued for the next batch round trip, in logical order.
#[derive(Debug, Clone, Default)]
pub struct OperationsQueue {
    operations: Vec<GridDialectOperation>,
}

impl OperationsQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a write.
    pub fn push(&mut self, operation: GridDialectOperation) {
        self.operations.push(operation);
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no writes are queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Takes every queued write, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<GridDialectOperation> {
        std::mem::take(&mut self.operations)
    }

    /// Returns the latest queued state of a tuple.
    ///
    /// `None` when nothing is queued for `key`, `Some(None)` when its latest
    /// queued write is a removal.
    pub fn pending_tuple(&self, key: &EntityKey) -> Option<Option<&Tuple>> {
        self.operations.iter().rev().find_map(|op| match op {
            GridDialectOperation::InsertOrUpdateTuple { key: k, tuple } if k == key => {
                Some(Some(tuple))
            }
            GridDialectOperation::RemoveTuple { key: k } if k == key => Some(None),
            _ => None,
        })
    }

    /// Returns the latest queued state of an association.
    pub fn pending_association(&self, key: &AssociationKey) -> Option<Option<&Association>> {
        self.operations.iter().rev().find_map(|op| match op {
            GridDialectOperation::InsertOrUpdateAssociation {
                key: k,
                association,
            } if k == key => Some(Some(association)),
            GridDialectOperation::RemoveAssociation { key: k } if k == key => Some(None),
            _ => None,
        })
    }
}
