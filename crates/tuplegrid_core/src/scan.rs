//! Mass scans over every tuple of one or more entity kinds.
//!
//! One producer thread per table feeds a bounded queue; a pool of consumer
//! threads drains it. When the last producer finishes it enqueues a sentinel,
//! and every consumer that takes the sentinel puts it back before exiting so
//! that all consumers are released.

use crate::config::MassScanConfig;
use crate::dialect::GridDialect;
use crate::error::{GridError, GridResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tuplegrid_model::{EntityKeyMetadata, Tuple};

/// Receives tuples from [`GridDialect::for_each_tuple`].
pub trait ModelConsumer {
    /// Handles one tuple. An error stops the scan.
    fn consume(&mut self, tuple: Tuple) -> GridResult<()>;
}

impl<F> ModelConsumer for F
where
    F: FnMut(Tuple) -> GridResult<()>,
{
    fn consume(&mut self, tuple: Tuple) -> GridResult<()> {
        self(tuple)
    }
}

/// Cooperative cancellation flag shared between a scan and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

enum ScanItem {
    Tuple(Tuple),
    Done,
}

struct ScanQueue {
    items: Mutex<VecDeque<ScanItem>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl ScanQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Blocks while the queue is full; gives up once `halted` holds.
    fn put(
        &self,
        tuple: Tuple,
        poll_interval: Duration,
        halted: impl Fn() -> bool,
    ) -> GridResult<()> {
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            if halted() {
                return Err(GridError::Cancelled);
            }
            self.not_full.wait_for(&mut items, poll_interval);
        }
        items.push_back(ScanItem::Tuple(tuple));
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueues the sentinel regardless of capacity.
    fn finish(&self) {
        let mut items = self.items.lock();
        items.push_back(ScanItem::Done);
        self.not_empty.notify_all();
    }

    fn poll(&self, timeout: Duration) -> Option<ScanItem> {
        let mut items = self.items.lock();
        if items.is_empty() {
            self.not_empty.wait_for(&mut items, timeout);
        }
        let item = items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }
}

/// Shared state of one scan run.
struct ScanState<'a> {
    queue: ScanQueue,
    producers_left: AtomicUsize,
    processed: AtomicU64,
    aborted: AtomicBool,
    first_error: Mutex<Option<GridError>>,
    cancel: &'a CancellationToken,
}

impl ScanState<'_> {
    fn halted(&self) -> bool {
        self.cancel.is_cancelled() || self.aborted.load(Ordering::Acquire)
    }

    fn fail(&self, error: GridError) {
        self.aborted.store(true, Ordering::Release);
        if matches!(error, GridError::Cancelled) {
            return;
        }
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(error);
        }
    }
}

/// Runs a worker over every tuple of several tables in parallel.
#[derive(Debug, Clone, Default)]
pub struct ParallelTupleScan {
    config: MassScanConfig,
}

impl ParallelTupleScan {
    /// Creates a scan with the given settings.
    pub fn new(config: MassScanConfig) -> Self {
        Self { config }
    }

    /// Feeds every tuple of `tables` to `worker` and returns how many were
    /// processed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the dialect or the worker, or
    /// `Cancelled` if `cancel` fired before the scan completed.
    pub fn run<W>(
        &self,
        dialect: &dyn GridDialect,
        tables: &[EntityKeyMetadata],
        worker: W,
        cancel: &CancellationToken,
    ) -> GridResult<u64>
    where
        W: Fn(Tuple) -> GridResult<()> + Sync,
    {
        if tables.is_empty() {
            return Ok(0);
        }
        let poll_interval = self.config.poll_interval;
        let consumers = self.config.consumer_threads.max(1);
        let state = ScanState {
            queue: ScanQueue::new(self.config.queue_capacity.max(1)),
            producers_left: AtomicUsize::new(tables.len()),
            processed: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
            cancel,
        };
        debug!(
            target: "tuplegrid::scan",
            tables = tables.len(),
            consumers,
            capacity = state.queue.capacity,
            "starting mass scan"
        );

        std::thread::scope(|s| {
            for metadata in tables {
                let state = &state;
                s.spawn(move || {
                    let mut push =
                        |tuple: Tuple| state.queue.put(tuple, poll_interval, || state.halted());
                    if let Err(error) = dialect.for_each_tuple(&mut push, metadata) {
                        state.fail(error);
                    }
                    if state.producers_left.fetch_sub(1, Ordering::AcqRel) == 1 {
                        state.queue.finish();
                    }
                });
            }
            for _ in 0..consumers {
                let state = &state;
                let worker = &worker;
                s.spawn(move || loop {
                    if state.halted() {
                        break;
                    }
                    match state.queue.poll(poll_interval) {
                        Some(ScanItem::Tuple(tuple)) => match worker(tuple) {
                            Ok(()) => {
                                state.processed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(error) => {
                                state.fail(error);
                                break;
                            }
                        },
                        Some(ScanItem::Done) => {
                            state.queue.finish();
                            break;
                        }
                        None => {}
                    }
                });
            }
        });

        let processed = state.processed.load(Ordering::Acquire);
        if let Some(error) = state.first_error.lock().take() {
            warn!(target: "tuplegrid::scan", processed, error = %error, "mass scan failed");
            return Err(error);
        }
        if cancel.is_cancelled() {
            debug!(target: "tuplegrid::scan", processed, "mass scan cancelled");
            return Err(GridError::Cancelled);
        }
        debug!(target: "tuplegrid::scan", processed, "mass scan finished");
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::tests::RecordingDialect;
    use std::collections::HashSet;
    use tuplegrid_model::{EntityKey, Value};

    fn populated(tables: &[&str], rows_per_table: i64) -> (RecordingDialect, Vec<EntityKeyMetadata>) {
        let dialect = RecordingDialect::default();
        let mut metadata = Vec::new();
        for table in tables {
            let meta = EntityKeyMetadata::new(*table, ["id"]);
            for id in 0..rows_per_table {
                let mut tuple = Tuple::new();
                tuple.put("id", id);
                tuple.put("table", *table);
                dialect.rows.lock().insert(
                    EntityKey::new(meta.clone(), vec![Value::Integer(id)]),
                    tuple.into_applied(),
                );
            }
            metadata.push(meta);
        }
        (dialect, metadata)
    }

    fn config() -> MassScanConfig {
        MassScanConfig::new()
            .queue_capacity(4)
            .consumer_threads(3)
            .poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn processes_every_tuple_once() {
        let (dialect, tables) = populated(&["Shipment", "Invoice"], 50);
        let seen = Mutex::new(HashSet::new());

        let processed = ParallelTupleScan::new(config())
            .run(
                &dialect,
                &tables,
                |tuple| {
                    let id = (tuple.get("table"), tuple.get("id"));
                    assert!(seen.lock().insert(id));
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(processed, 100);
        assert_eq!(seen.lock().len(), 100);
    }

    #[test]
    fn more_consumers_than_tuples() {
        let (dialect, tables) = populated(&["Shipment"], 2);
        let scan = ParallelTupleScan::new(config().consumer_threads(8));
        let processed = scan
            .run(&dialect, &tables, |_| Ok(()), &CancellationToken::new())
            .unwrap();
        assert_eq!(processed, 2);
    }

    #[test]
    fn first_worker_error_is_returned() {
        let (dialect, tables) = populated(&["Shipment"], 30);
        let err = ParallelTupleScan::new(config())
            .run(
                &dialect,
                &tables,
                |tuple| match tuple.get("id") {
                    Some(Value::Integer(7)) => Err(GridError::backend("poisoned row")),
                    _ => Ok(()),
                },
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, GridError::Backend { .. }));
    }

    #[test]
    fn cancelled_scan_stops() {
        let (dialect, tables) = populated(&["Shipment"], 30);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ParallelTupleScan::new(config())
            .run(&dialect, &tables, |_| Ok(()), &cancel)
            .unwrap_err();
        assert!(matches!(err, GridError::Cancelled));
    }

    #[test]
    fn no_tables_is_empty_scan() {
        let dialect = RecordingDialect::default();
        let processed = ParallelTupleScan::default()
            .run(&dialect, &[], |_| Ok(()), &CancellationToken::new())
            .unwrap();
        assert_eq!(processed, 0);
    }
}
