//! Failure reporting: rollback and failed-operation contexts.

use crate::dialect::GridDialectOperation;
use crate::types::TransactionId;
use tracing::warn;

/// What to do after a failed dialect operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandlingStrategy {
    /// Propagate the error and roll back.
    #[default]
    Abort,
    /// Ignore the failure and carry on with the flush.
    ///
    /// Honoured only for errors where [`crate::GridError::allows_continue`]
    /// holds.
    Continue,
}

/// Passed to [`ErrorHandler::on_rollback`].
#[derive(Debug, Clone)]
pub struct RollbackContext {
    /// Transaction being rolled back.
    pub transaction: TransactionId,
    /// Operations applied before the failure, in order.
    pub applied_operations: Vec<GridDialectOperation>,
    /// Rendered error that caused the rollback.
    pub error: String,
}

/// Passed to [`ErrorHandler::on_failed_operation`].
#[derive(Debug, Clone)]
pub struct FailedOperationContext {
    /// Transaction the operation belonged to.
    pub transaction: TransactionId,
    /// The operation that failed.
    pub failed_operation: GridDialectOperation,
    /// Operations applied before the failure, in order.
    pub applied_operations: Vec<GridDialectOperation>,
    /// Rendered error.
    pub error: String,
}

/// Receives failure notifications from the flush driver.
pub trait ErrorHandler: Send + Sync {
    /// Called once when a transaction rolls back.
    fn on_rollback(&self, context: &RollbackContext);

    /// Called for each failed operation.
    fn on_failed_operation(&self, context: &FailedOperationContext) -> ErrorHandlingStrategy {
        let _ = context;
        ErrorHandlingStrategy::Abort
    }
}

/// Handler that logs failures and always aborts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_rollback(&self, context: &RollbackContext) {
        warn!(
            target: "tuplegrid::session",
            transaction = %context.transaction,
            applied = context.applied_operations.len(),
            error = %context.error,
            "transaction rolled back"
        );
    }

    fn on_failed_operation(&self, context: &FailedOperationContext) -> ErrorHandlingStrategy {
        warn!(
            target: "tuplegrid::session",
            transaction = %context.transaction,
            operation = %context.failed_operation.kind(),
            error = %context.error,
            "dialect operation failed"
        );
        ErrorHandlingStrategy::Abort
    }
}
