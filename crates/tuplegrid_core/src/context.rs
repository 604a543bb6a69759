//! Per-transaction state passed explicitly to every dialect call.

use crate::dialect::{OperationLog, OperationsQueue};
use crate::failure::ErrorHandler;
use crate::types::TransactionId;
use std::fmt;
use std::sync::Arc;

/// State of one flush cycle.
///
/// Dialects hold no per-transaction state; everything that lives for the
/// duration of a unit of work is carried here.
pub struct TransactionContext {
    id: TransactionId,
    /// Writes waiting for the next batch round trip.
    pub queue: OperationsQueue,
    /// Operations applied so far.
    pub log: OperationLog,
    error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl TransactionContext {
    /// Creates a context with no error handler.
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            queue: OperationsQueue::new(),
            log: OperationLog::new(),
            error_handler: None,
        }
    }

    /// Registers the handler notified about failures.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the registered error handler.
    pub fn error_handler(&self) -> Option<&Arc<dyn ErrorHandler>> {
        self.error_handler.as_ref()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .field("applied", &self.log.len())
            .finish_non_exhaustive()
    }
}
