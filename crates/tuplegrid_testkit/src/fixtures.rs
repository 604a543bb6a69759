//! Test fixtures and grid helpers.
//!
//! Provides grids over the reference datastores, a shipment model to store
//! in them and an error handler that records what it is told.

use parking_lot::Mutex;
use std::sync::Arc;
use tuplegrid_core::{
    ErrorHandler, ErrorHandlingStrategy, FailedOperationContext, Grid, GridConfig, GridDialect,
    OperationKind, RollbackContext,
};
use tuplegrid_datastore::{cache_dialect, MapDatastore, MapDialect};
use tuplegrid_model::{EntityKey, EntityKeyMetadata, Tuple, Value};
use tuplegrid_query::{EntityMapping, MappingRegistry};

/// Entity name and table of the shipment fixture.
pub const SHIPMENT: &str = "Shipment";

/// Key metadata of the shipment table.
pub fn shipment_metadata() -> EntityKeyMetadata {
    EntityKeyMetadata::new(SHIPMENT, ["id"])
}

/// Key of shipment `id`.
pub fn shipment_key(id: i64) -> EntityKey {
    EntityKey::new(shipment_metadata(), vec![Value::Integer(id)])
}

/// Columns of shipment `id` in `state`.
pub fn shipment_tuple(id: i64, state: &str) -> Tuple {
    let mut tuple = Tuple::new();
    tuple.put("id", id);
    tuple.put("state", state);
    tuple.put("version", 1);
    tuple
}

/// Query mapping for the shipment entity.
pub fn shipment_mapping() -> MappingRegistry {
    MappingRegistry::new().with(EntityMapping::new(SHIPMENT))
}

/// Everything an error handler was told, in order.
#[derive(Debug, Default)]
pub struct RecordingErrorHandler {
    rollbacks: Mutex<Vec<RollbackContext>>,
    failures: Mutex<Vec<FailedOperationContext>>,
    strategy: ErrorHandlingStrategy,
}

impl RecordingErrorHandler {
    /// Creates a handler that asks to abort on failed operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler that asks to continue past failed operations.
    pub fn continuing() -> Self {
        Self {
            strategy: ErrorHandlingStrategy::Continue,
            ..Self::default()
        }
    }

    /// Rollback contexts received so far.
    pub fn rollbacks(&self) -> Vec<RollbackContext> {
        self.rollbacks.lock().clone()
    }

    /// Failed-operation contexts received so far.
    pub fn failures(&self) -> Vec<FailedOperationContext> {
        self.failures.lock().clone()
    }

    /// Kinds of the operations applied before the last rollback.
    pub fn last_rollback_kinds(&self) -> Option<Vec<OperationKind>> {
        self.rollbacks.lock().last().map(|context| {
            context
                .applied_operations
                .iter()
                .map(|operation| operation.kind())
                .collect()
        })
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn on_rollback(&self, context: &RollbackContext) {
        self.rollbacks.lock().push(context.clone());
    }

    fn on_failed_operation(&self, context: &FailedOperationContext) -> ErrorHandlingStrategy {
        self.failures.lock().push(context.clone());
        self.strategy
    }
}

/// A grid over a reference datastore with a recording error handler.
pub struct TestGrid {
    /// The grid.
    pub grid: Grid,
    /// Handler registered on the grid.
    pub handler: Arc<RecordingErrorHandler>,
    datastore: Option<Arc<MapDatastore>>,
}

impl TestGrid {
    /// Creates a grid over an empty map datastore.
    pub fn map() -> Self {
        Self::map_with(GridConfig::default())
    }

    /// Creates a grid over an empty map datastore with `config`.
    pub fn map_with(config: GridConfig) -> Self {
        let datastore = Arc::new(MapDatastore::new());
        let dialect = Arc::new(MapDialect::new(Arc::clone(&datastore)));
        let mut grid = Self::over(dialect, config);
        grid.datastore = Some(datastore);
        grid
    }

    /// Creates a grid over an empty map datastore that stores association
    /// rows inside their owning entity.
    pub fn map_embedded() -> Self {
        let datastore = Arc::new(MapDatastore::new());
        let dialect = MapDialect::new(Arc::clone(&datastore)).with_embedded_associations();
        let mut grid = Self::over(Arc::new(dialect), GridConfig::default());
        grid.datastore = Some(datastore);
        grid
    }

    /// Creates a grid over an empty cache datastore laid out per `config`.
    pub fn cache(config: GridConfig) -> Self {
        Self::over(cache_dialect(&config), config)
    }

    /// Creates a grid over any dialect.
    pub fn over(dialect: Arc<dyn GridDialect>, config: GridConfig) -> Self {
        let handler = Arc::new(RecordingErrorHandler::new());
        let shared: Arc<dyn ErrorHandler> = handler.clone();
        Self {
            grid: Grid::new(dialect, config).with_error_handler(shared),
            handler,
            datastore: None,
        }
    }

    /// The backing map datastore, for grids created with [`TestGrid::map`].
    pub fn datastore(&self) -> Option<&Arc<MapDatastore>> {
        self.datastore.as_ref()
    }
}

impl std::ops::Deref for TestGrid {
    type Target = Grid;

    fn deref(&self) -> &Self::Target {
        &self.grid
    }
}

/// Runs a test with a grid over an empty map datastore.
///
/// # Example
///
/// ```rust,ignore
/// use tuplegrid_testkit::with_map_grid;
///
/// #[test]
/// fn my_test() {
///     with_map_grid(|grid| {
///         grid.transaction(|session| session.get(&shipment_key(1))).unwrap();
///     });
/// }
/// ```
pub fn with_map_grid<F, R>(f: F) -> R
where
    F: FnOnce(&TestGrid) -> R,
{
    let grid = TestGrid::map();
    f(&grid)
}

/// Runs a test with a grid over an empty cache datastore.
pub fn with_cache_grid<F, R>(config: GridConfig, f: F) -> R
where
    F: FnOnce(&TestGrid) -> R,
{
    let grid = TestGrid::cache(config);
    f(&grid)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a map grid holding shipments `0..count`, all `INITIAL`.
    pub fn populated_map_grid(count: i64) -> TestGrid {
        let grid = TestGrid::map();
        populate(&grid, count);
        grid
    }

    /// Inserts shipments `0..count` in one unit of work.
    pub fn populate(grid: &Grid, count: i64) {
        grid.transaction(|session| {
            for id in 0..count {
                session.insert(shipment_key(id), shipment_tuple(id, "INITIAL"));
            }
            Ok(())
        })
        .expect("Failed to populate grid");
    }
}
