//! Integration tests for persistence strategies and key mapping.

use std::sync::Arc;
use tuplegrid_core::{
    CacheMappingType, GridConfig, GridError, KeyProvider, NextValueRequest, PersistenceStrategy,
    SequenceDefinition,
};
use tuplegrid_datastore::CacheDialect;
use tuplegrid_model::{
    AssociationKey, AssociationKeyMetadata, AssociationKind, EntityKey, EntityKeyMetadata,
    IdSourceKey, IdSourceKeyMetadata, RowKey, Tuple, Value,
};
use tuplegrid_testkit::prelude::*;

fn parcel_key(id: i64) -> EntityKey {
    EntityKey::new(EntityKeyMetadata::new("Parcel", ["id"]), vec![Value::Integer(id)])
}

fn items_key(shipment: i64) -> AssociationKey {
    let metadata = AssociationKeyMetadata::builder("Shipment_items")
        .column_names(["shipment_id"])
        .row_key_column_names(["shipment_id", "position"])
        .kind(AssociationKind::EmbeddedCollection)
        .collection_role("items")
        .build();
    AssociationKey::new(metadata, vec![Value::Integer(shipment)], shipment_key(shipment))
}

fn assert_entity_keys_round_trip<EK, AK, ISK>(provider: &dyn KeyProvider<EK, AK, ISK>) {
    for key in [shipment_key(1), shipment_key(-4), parcel_key(1)] {
        let persisted = provider.entity_key(&key);
        assert_eq!(provider.to_entity_key(key.metadata(), &persisted), key);
    }
}

#[test]
fn entity_keys_round_trip_through_both_providers() {
    let per_table = PersistenceStrategy::per_table();
    assert_entity_keys_round_trip(per_table.key_provider());
    let per_kind = PersistenceStrategy::per_kind();
    assert_entity_keys_round_trip(per_kind.key_provider());
}

#[test]
fn per_kind_keys_of_equal_ids_do_not_collide() {
    let config = GridConfig::default().cache_mapping(CacheMappingType::CachePerKind);
    let grid = TestGrid::cache(config);
    grid.transaction(|session| {
        session.insert(shipment_key(1), shipment_tuple(1, "INITIAL"));
        let mut parcel = Tuple::new();
        parcel.put("id", 1);
        parcel.put("weight", 40);
        session.insert(parcel_key(1), parcel);
        Ok(())
    })
    .unwrap();

    let (shipment, parcel) = grid
        .transaction(|session| Ok((session.get(&shipment_key(1))?, session.get(&parcel_key(1))?)))
        .unwrap();
    let shipment = shipment.unwrap();
    let parcel = parcel.unwrap();
    assert_eq!(shipment.get("state"), Some(Value::from("INITIAL")));
    assert!(shipment.get("weight").is_none());
    assert_eq!(parcel.get("weight"), Some(Value::Integer(40)));
    assert!(parcel.get("state").is_none());

    let strategy = PersistenceStrategy::per_kind();
    let provider = strategy.key_provider();
    assert_ne!(
        provider.entity_key(&shipment_key(1)),
        provider.entity_key(&parcel_key(1))
    );
}

#[test]
fn per_table_layout_keeps_tables_in_their_own_caches() {
    let strategy = Arc::new(PersistenceStrategy::per_table());
    let grid = TestGrid::over(
        Arc::new(CacheDialect::new(Arc::clone(&strategy))),
        GridConfig::default(),
    );
    scenarios::populate(&grid, 2);
    grid.transaction(|session| {
        let mut association = session.get_or_create_association(&items_key(1))?;
        let mut row = Tuple::new();
        row.put("position", 0);
        row.put("sku", "A-100");
        association.put(
            RowKey::new(
                "Shipment_items",
                ["shipment_id", "position"],
                vec![Value::Integer(1), Value::Integer(0)],
            ),
            row,
        );
        session.save_association(items_key(1), association);
        Ok(())
    })
    .unwrap();

    let manager = strategy.cache_manager();
    assert_eq!(
        manager.cache_names(),
        vec!["Shipment".to_string(), "associations_Shipment_items".to_string()]
    );
    assert_eq!(manager.entity_cache(SHIPMENT).len(), 2);

    let loaded = grid
        .transaction(|session| session.get_association(&items_key(1)))
        .unwrap()
        .unwrap();
    assert_eq!(loaded.size(), 1);
    assert_eq!(loaded.rows()[0].1.get("sku"), Some(Value::from("A-100")));
}

#[test]
fn association_key_ignores_owner_when_persisted() {
    let strategy = PersistenceStrategy::per_table();
    let provider = strategy.key_provider();
    let a = items_key(1);
    let b = AssociationKey::new(a.metadata().clone(), vec![Value::Integer(1)], parcel_key(9));
    assert_eq!(provider.association_key(&a), provider.association_key(&b));
}

#[test]
fn generators_are_isolated_by_segment() {
    for mapping in [CacheMappingType::CachePerTable, CacheMappingType::CachePerKind] {
        let grid = TestGrid::cache(GridConfig::default().cache_mapping(mapping));
        let table =
            IdSourceKeyMetadata::for_table("hibernate_sequences", "sequence_name", "next_val");
        let shipments = IdSourceKey::for_table(table.clone(), "shipment");
        let parcels = IdSourceKey::for_table(table, "parcel");

        let values = grid
            .transaction(|session| {
                Ok(vec![
                    session.next_value(&NextValueRequest::new(shipments.clone(), 1, 1))?,
                    session.next_value(&NextValueRequest::new(shipments.clone(), 1, 1))?,
                    session.next_value(&NextValueRequest::new(parcels.clone(), 5, 100))?,
                    session.next_value(&NextValueRequest::new(parcels.clone(), 5, 100))?,
                ])
            })
            .unwrap();
        assert_eq!(values, vec![1, 2, 100, 105]);
    }
}

#[test]
fn sequences_are_created_at_schema_initialization() {
    let grids = [
        TestGrid::map(),
        TestGrid::cache(GridConfig::default().cache_mapping(CacheMappingType::CachePerTable)),
        TestGrid::cache(GridConfig::default().cache_mapping(CacheMappingType::CachePerKind)),
    ];
    for grid in grids {
        let sequence = SequenceDefinition::new(IdSourceKeyMetadata::for_sequence("parcel_seq"), 10);
        let request = NextValueRequest::new(sequence.key(), 1, 0);

        let err = grid
            .transaction(|session| session.next_value(&request))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidOperation { .. }));

        grid.initialize_schema(std::slice::from_ref(&sequence)).unwrap();
        let drawn = grid
            .transaction(|session| Ok([session.next_value(&request)?, session.next_value(&request)?]))
            .unwrap();
        assert_eq!(drawn, [10, 11]);

        grid.initialize_schema(&[sequence]).unwrap();
        assert_eq!(grid.transaction(|session| session.next_value(&request)).unwrap(), 12);
    }
}
