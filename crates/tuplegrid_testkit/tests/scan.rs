//! Integration tests for mass scans over the reference datastores.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tuplegrid_core::{
    CacheMappingType, CancellationToken, Grid, GridConfig, GridError, MassScanConfig,
};
use tuplegrid_model::{EntityKey, EntityKeyMetadata, Tuple, Value};
use tuplegrid_testkit::prelude::*;

fn scan_config(mapping: CacheMappingType) -> GridConfig {
    GridConfig::default().cache_mapping(mapping).mass_scan(
        MassScanConfig::new()
            .queue_capacity(8)
            .consumer_threads(4)
            .poll_interval(Duration::from_millis(5)),
    )
}

fn parcel_metadata() -> EntityKeyMetadata {
    EntityKeyMetadata::new("Parcel", ["id"])
}

fn insert_parcels(grid: &Grid, count: i64) {
    grid.transaction(|session| {
        for id in 0..count {
            let mut tuple = Tuple::new();
            tuple.put("id", id);
            tuple.put("weight", id * 10);
            session.insert(
                EntityKey::new(parcel_metadata(), vec![Value::Integer(id)]),
                tuple,
            );
        }
        Ok(())
    })
    .unwrap();
}

fn scan_ids(grid: &Grid, tables: &[EntityKeyMetadata]) -> (u64, Vec<(String, i64)>) {
    let seen = Mutex::new(Vec::new());
    let processed = grid
        .scan(
            tables,
            |tuple| {
                let id = tuple.get("id").and_then(|v| v.as_integer()).unwrap_or(-1);
                let kind = if tuple.get("weight").is_some() {
                    "Parcel"
                } else {
                    SHIPMENT
                };
                seen.lock().push((kind.to_string(), id));
                Ok(())
            },
            &CancellationToken::new(),
        )
        .unwrap();
    (processed, seen.into_inner())
}

#[test]
fn every_tuple_is_processed_exactly_once() {
    init_tracing();
    let grid = TestGrid::map_with(scan_config(CacheMappingType::CachePerTable));
    scenarios::populate(&grid, 300);
    insert_parcels(&grid, 200);

    let (processed, seen) = scan_ids(&grid, &[shipment_metadata(), parcel_metadata()]);
    assert_eq!(processed, 500);
    assert_eq!(seen.len(), 500);
    let distinct: HashSet<(String, i64)> = seen.into_iter().collect();
    assert_eq!(distinct.len(), 500);
}

#[test]
fn per_kind_cache_scans_only_requested_tables() {
    let grid = TestGrid::cache(scan_config(CacheMappingType::CachePerKind));
    scenarios::populate(&grid, 50);
    insert_parcels(&grid, 30);

    let (processed, seen) = scan_ids(&grid, &[parcel_metadata()]);
    assert_eq!(processed, 30);
    assert!(seen.iter().all(|(kind, _)| kind == "Parcel"));
}

#[test]
fn per_table_cache_scans_every_table() {
    let grid = TestGrid::cache(scan_config(CacheMappingType::CachePerTable));
    scenarios::populate(&grid, 40);
    insert_parcels(&grid, 40);

    let (processed, _) = scan_ids(&grid, &[shipment_metadata(), parcel_metadata()]);
    assert_eq!(processed, 80);
}

#[test]
fn empty_table_finishes_immediately() {
    let grid = TestGrid::map_with(scan_config(CacheMappingType::CachePerTable));
    let (processed, seen) = scan_ids(&grid, &[shipment_metadata()]);
    assert_eq!(processed, 0);
    assert!(seen.is_empty());
}

#[test]
fn worker_error_stops_the_scan() {
    let grid = TestGrid::map_with(scan_config(CacheMappingType::CachePerTable));
    scenarios::populate(&grid, 200);

    let err = grid
        .scan(
            &[shipment_metadata()],
            |tuple| match tuple.get("id").and_then(|v| v.as_integer()) {
                Some(13) => Err(GridError::backend("unlucky parcel")),
                _ => Ok(()),
            },
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, GridError::Backend { .. }));
}

#[test]
fn cancellation_is_reported() {
    let grid = TestGrid::map_with(scan_config(CacheMappingType::CachePerTable));
    scenarios::populate(&grid, 500);

    let cancel = CancellationToken::new();
    let processed = AtomicU64::new(0);
    let err = grid
        .scan(
            &[shipment_metadata()],
            |_| {
                if processed.fetch_add(1, Ordering::SeqCst) == 10 {
                    cancel.cancel();
                }
                Ok(())
            },
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, GridError::Cancelled));
    assert!(processed.load(Ordering::SeqCst) < 500);
}
