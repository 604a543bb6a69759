//! Load helpers for TupleGrid.
//!
//! Each helper drives a grid with many short units of work, possibly from
//! several threads, and reports how many of them committed.

use crate::fixtures::{shipment_key, shipment_tuple};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tuplegrid_core::{Grid, GridError, GridResult, NextValueRequest, SequenceDefinition};
use tuplegrid_model::{IdSourceKeyMetadata, Tuple};

/// Outcome of one load run.
#[derive(Debug, Clone)]
pub struct StressReport {
    /// Units of work that committed.
    pub committed: usize,
    /// Units of work that returned an error.
    pub failed: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl StressReport {
    fn from_tally(tally: &Tally, started: Instant) -> Self {
        Self {
            committed: tally.committed.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        }
    }

    /// Units of work attempted.
    pub fn attempted(&self) -> usize {
        self.committed + self.failed
    }

    /// Attempted units of work per second, or 0 for an instant run.
    pub fn throughput(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.attempted() as f64 / seconds
        } else {
            0.0
        }
    }

    /// Emits the report as one `info` event.
    pub fn log_summary(&self, name: &str) {
        info!(
            run = name,
            committed = self.committed,
            failed = self.failed,
            elapsed = ?self.elapsed,
            throughput = self.throughput(),
            "load run finished"
        );
    }
}

/// Shape of a load run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Units of work to run, split evenly across threads.
    pub operations: usize,
    /// Worker threads, where the helper is concurrent.
    pub threads: usize,
    /// Distinct shipment ids the run touches.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            entity_count: 1_000,
        }
    }
}

#[derive(Default)]
struct Tally {
    committed: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record<T>(&self, outcome: &GridResult<T>) {
        let counter = if outcome.is_ok() {
            &self.committed
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn id_of(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

/// Defines one sequence (initial 0, increment 1) and draws from it on every
/// thread.
///
/// Returns the report and every value drawn, in no particular order.
pub fn stress_concurrent_next_value(
    grid: &Grid,
    config: &StressConfig,
) -> GridResult<(StressReport, Vec<i64>)> {
    let sequence = SequenceDefinition::new(IdSourceKeyMetadata::for_sequence("stress_seq"), 0);
    grid.initialize_schema(std::slice::from_ref(&sequence))?;
    let request = NextValueRequest::new(sequence.key(), 1, 0);
    let per_thread = config.operations / config.threads.max(1);
    let tally = Tally::default();

    let started = Instant::now();
    let values = thread::scope(|scope| {
        let workers: Vec<_> = (0..config.threads)
            .map(|_| {
                let (request, tally) = (&request, &tally);
                scope.spawn(move || {
                    (0..per_thread)
                        .filter_map(|_| {
                            let drawn = grid.transaction(|session| session.next_value(request));
                            tally.record(&drawn);
                            drawn.ok()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().expect("worker panicked"))
            .collect()
    });

    Ok((StressReport::from_tally(&tally, started), values))
}

/// Inserts shipments `0..operations`, one unit of work each.
pub fn stress_sequential_inserts(grid: &Grid, config: &StressConfig) -> StressReport {
    let tally = Tally::default();
    let started = Instant::now();
    for id in (0..config.operations).map(id_of) {
        tally.record(&grid.transaction(|session| {
            session.insert(shipment_key(id), shipment_tuple(id, "INITIAL"));
            Ok(())
        }));
    }
    StressReport::from_tally(&tally, started)
}

/// Cycles update, read and remove over `entity_count` shipment ids.
pub fn stress_mixed_operations(grid: &Grid, config: &StressConfig) -> StressReport {
    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        let key = shipment_key(id_of(i % config.entity_count.max(1)));
        tally.record(&grid.transaction(|session| {
            match i % 3 {
                0 => {
                    let mut tuple = Tuple::new();
                    tuple.put("state", "IN_TRANSIT");
                    session.update(key.clone(), tuple);
                }
                1 => {
                    session.get(&key)?;
                }
                _ => session.remove(key.clone()),
            }
            Ok(())
        }));
    }
    StressReport::from_tally(&tally, started)
}

/// Reads stored shipments from several threads, one session per thread.
///
/// A missing shipment counts as a failure.
pub fn stress_concurrent_reads(grid: &Grid, config: &StressConfig) -> StressReport {
    let per_thread = config.operations / config.threads.max(1);
    let entity_count = config.entity_count.max(1);
    let tally = Tally::default();

    let started = Instant::now();
    thread::scope(|scope| {
        for worker in 0..config.threads {
            let tally = &tally;
            scope.spawn(move || {
                let mut session = grid.begin();
                for i in 0..per_thread {
                    let id = id_of((worker * per_thread + i) % entity_count);
                    let found = session.get(&shipment_key(id)).and_then(|tuple| {
                        tuple.ok_or_else(|| GridError::invalid_operation("shipment missing"))
                    });
                    tally.record(&found);
                }
            });
        }
    });
    StressReport::from_tally(&tally, started)
}

/// Inserts shipments but fails every other unit of work after the insert.
pub fn stress_transaction_aborts(grid: &Grid, config: &StressConfig) -> StressReport {
    let tally = Tally::default();
    let started = Instant::now();
    for i in 0..config.operations {
        let id = id_of(i);
        tally.record(&grid.transaction(|session| {
            session.insert(shipment_key(id), shipment_tuple(id, "INITIAL"));
            if i % 2 == 0 {
                return Err(GridError::invalid_operation("aborted on purpose"));
            }
            Ok(())
        }));
    }
    StressReport::from_tally(&tally, started)
}
