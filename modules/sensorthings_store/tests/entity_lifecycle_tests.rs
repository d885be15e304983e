//! Create, read, update and delete through a session

mod common;

use common::*;
use sensorthings_store::{
    ChangeKind, CompareOp, Entity, EntityProperty as P, EntityType as T, Expression, Id, Literal,
    NavProperty as N, PersistenceError, PropertyPath, PropertyValue, Query, QueryTarget,
    ResultValue, TimeValue,
};
use sensorthings_store::contract::Property;
use chrono::{TimeZone, Utc};
use serde_json::json;

#[tokio::test]
async fn test_thing_round_trip() -> anyhow::Result<()> {
    print_test_header(
        "test_thing_round_trip",
        &["A created thing reads back with the same properties", "and leaves one create message"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let properties = json!({"owner": "ops", "floor": 3});
    let id = insert(&session, thing("Boiler").with(P::Properties, properties.clone())).await?;
    println!("✅ inserted thing {id}");

    let stored = session
        .get(T::Thing, &id, &Query::new())
        .await?
        .ok_or_else(|| anyhow::anyhow!("thing {id} not found"))?;
    assert_eq!(stored.get(P::Name).and_then(PropertyValue::as_text), Some("Boiler"));
    assert_eq!(stored.get(P::Properties).and_then(PropertyValue::as_json), Some(&properties));

    let changes = session.take_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Create);
    assert_eq!(changes[0].id, id);
    println!("✅ read back and change message verified");

    tx.commit().await?;
    Ok(())
}

#[tokio::test]
async fn test_round_trip_of_structured_properties() -> anyhow::Result<()> {
    print_test_header(
        "test_round_trip_of_structured_properties",
        &["Locations, sensors and datastreams read back with every property they were created with"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (thing_id, _, _) = weather_station(&session).await?;
    let sensor_id = insert(&session, sensor("BME280")).await?;
    let property_id = insert(&session, observed_property("pressure")).await?;

    let originals = [
        location("Cellar", 8.41, 49.01),
        sensor("SHT31"),
        datastream("Pressure", &thing_id, &sensor_id, &property_id)
            .with(P::Properties, json!({"calibrated": true})),
    ];
    for original in originals {
        let entity_type = original.entity_type();
        let id = insert(&session, original.clone()).await?;
        let stored = session
            .get(entity_type, &id, &Query::new())
            .await?
            .ok_or_else(|| anyhow::anyhow!("{entity_type} {id} not found"))?;
        for (property, value) in original.values() {
            assert_eq!(stored.get(*property), Some(value), "{entity_type}.{property}");
        }
        println!("   {entity_type} {id} round-tripped");
    }
    println!("✅ all properties survived");
    Ok(())
}

/// Insert `original`, read it back and compare every property it was created with.
async fn round_trip(session: &sensorthings_store::Session<'_>, original: Entity) -> anyhow::Result<Id> {
    let entity_type = original.entity_type();
    let id = insert(session, original.clone()).await?;
    let stored = session
        .get(entity_type, &id, &Query::new())
        .await?
        .ok_or_else(|| anyhow::anyhow!("{entity_type} {id} not found"))?;
    for (property, value) in original.values() {
        assert_eq!(stored.get(*property), Some(value), "{entity_type}.{property}");
    }
    println!("   {entity_type} {id} round-tripped");
    Ok(id)
}

#[tokio::test]
async fn test_round_trip_of_every_other_entity_type() -> anyhow::Result<()> {
    print_test_header(
        "test_round_trip_of_every_other_entity_type",
        &["Sensing and tasking entities read back with every property they were created with"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let at = |hour: u32| Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).single();
    let (thing_id, _, _) = weather_station(&session).await?;
    let sensor_id = insert(&session, sensor("Wind sensor")).await?;

    let speed = round_trip(
        &session,
        observed_property("wind speed").with(P::Properties, json!({"quantity": "speed"})),
    )
    .await?;
    let gust = round_trip(&session, observed_property("gust")).await?;
    round_trip(
        &session,
        Entity::new(T::MultiDatastream)
            .with(P::Name, "Wind")
            .with(P::Description, "speed and gust")
            .with(P::MultiObservationDataTypes, json!(["OM_Measurement", "OM_Measurement"]))
            .with(P::UnitOfMeasurements, json!([{"name": "m/s"}, {"name": "m/s"}]))
            .with_one(N::Thing, Entity::reference(T::Thing, thing_id.clone()))
            .with_one(N::Sensor, Entity::reference(T::Sensor, sensor_id))
            .with_many(
                N::ObservedProperties,
                vec![Entity::reference(T::ObservedProperty, speed), Entity::reference(T::ObservedProperty, gust)],
            ),
    )
    .await?;
    round_trip(
        &session,
        Entity::new(T::FeatureOfInterest)
            .with(P::Name, "Field")
            .with(P::Description, "north field")
            .with(P::EncodingType, "application/geo+json")
            .with(P::Feature, json!({"type": "Point", "coordinates": [7.5, 51.2]})),
    )
    .await?;

    let mover = insert(&session, thing("Rover")).await?;
    let time = at(6).ok_or_else(|| anyhow::anyhow!("invalid time"))?;
    round_trip(
        &session,
        Entity::new(T::HistoricalLocation)
            .with(P::Time, time)
            .with_one(N::Thing, Entity::reference(T::Thing, mover))
            .with_many(N::Locations, vec![location("Crater", 9.0, 9.0)]),
    )
    .await?;

    let actuator_id = round_trip(
        &session,
        Entity::new(T::Actuator)
            .with(P::Name, "Valve")
            .with(P::Description, "irrigation valve")
            .with(P::EncodingType, "application/pdf")
            .with(P::Metadata, "http://example.org/valve.pdf"),
    )
    .await?;
    let capability_id = round_trip(
        &session,
        Entity::new(T::TaskingCapability)
            .with(P::Name, "Open valve")
            .with(P::Description, "opens the irrigation valve")
            .with(P::TaskingParameters, json!({"type": "DataRecord", "field": [{"name": "minutes"}]}))
            .with_one(N::Thing, Entity::reference(T::Thing, thing_id))
            .with_one(N::Actuator, Entity::reference(T::Actuator, actuator_id)),
    )
    .await?;
    let created = at(7).ok_or_else(|| anyhow::anyhow!("invalid time"))?;
    round_trip(
        &session,
        Entity::new(T::Task)
            .with(P::CreationTime, created)
            .with(P::TaskingParameters, json!({"minutes": 15}))
            .with_one(N::TaskingCapability, Entity::reference(T::TaskingCapability, capability_id)),
    )
    .await?;
    println!("✅ every entity type survived");
    Ok(())
}

#[tokio::test]
async fn test_select_limits_returned_properties() -> anyhow::Result<()> {
    print_test_header("test_select_limits_returned_properties", &["Only selected properties come back"]);
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let id = insert(&session, thing("Pump")).await?;
    let stored = session
        .get(T::Thing, &id, &Query::new().select([P::Name]))
        .await?
        .ok_or_else(|| anyhow::anyhow!("thing {id} not found"))?;
    assert!(stored.is_set(P::Name));
    assert!(!stored.is_set(P::Description));
    assert_eq!(stored.id(), Some(&id));
    Ok(())
}

#[tokio::test]
async fn test_missing_required_property_is_incomplete() -> anyhow::Result<()> {
    print_test_header("test_missing_required_property_is_incomplete", &["A thing without description is rejected"]);
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let err = session
        .insert(Entity::new(T::Thing).with(P::Name, "Nameless"))
        .await
        .unwrap_err();
    println!("✅ rejected: {err}");
    assert!(matches!(err, PersistenceError::IncompleteEntity(_)));

    let err = session
        .insert(datastream("Orphan", &Id::Long(40), &Id::Long(41), &Id::Long(42)))
        .await
        .unwrap_err();
    println!("✅ rejected: {err}");
    assert!(matches!(err, PersistenceError::NoSuchEntity { .. }));
    Ok(())
}

#[tokio::test]
async fn test_observation_gets_generated_feature_of_interest() -> anyhow::Result<()> {
    print_test_header(
        "test_observation_gets_generated_feature_of_interest",
        &[
            "Observations without a feature get one generated from the thing's location",
            "and later observations reuse it",
        ],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_thing, location_id, datastream_id) = weather_station(&session).await?;

    let first = insert(&session, observation(&datastream_id, 21i64)).await?;
    let second = insert(&session, observation(&datastream_id, 22i64)).await?;

    let expand = Query::new().expand(N::FeatureOfInterest, Query::new());
    let mut features = Vec::new();
    for id in [&first, &second] {
        let stored = session
            .get(T::Observation, id, &expand)
            .await?
            .ok_or_else(|| anyhow::anyhow!("observation {id} not found"))?;
        assert!(stored.get(P::PhenomenonTime).and_then(PropertyValue::as_time).is_some());
        let feature = stored
            .linked(N::FeatureOfInterest)
            .ok_or_else(|| anyhow::anyhow!("observation {id} has no feature"))?;
        assert_eq!(
            feature.get(P::Feature).and_then(PropertyValue::as_json),
            Some(&json!({"type": "Point", "coordinates": [8.4, 49.0]}))
        );
        features.push(feature.id().cloned());
    }
    assert_eq!(features[0], features[1]);
    println!("✅ both observations share feature {:?}", features[0]);

    let generated = scalar(
        &tx,
        &format!("SELECT GEN_FOI_ID FROM LOCATIONS WHERE ID = {}", long(&location_id)),
    )
    .await?;
    assert_eq!(Some(Id::Long(generated)), features[0]);
    assert_eq!(scalar(&tx, "SELECT COUNT(*) FROM FEATURES").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_exact_decimal_results_survive() -> anyhow::Result<()> {
    print_test_header("test_exact_decimal_results_survive", &["21.50 reads back as 21.50, not 21.5"]);
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_, _, datastream_id) = weather_station(&session).await?;

    let exact: rust_decimal::Decimal = "21.50".parse()?;
    let id = insert(&session, observation(&datastream_id, ResultValue::Number(exact))).await?;
    let stored = session
        .get(T::Observation, &id, &Query::new().select([P::Result]))
        .await?
        .ok_or_else(|| anyhow::anyhow!("observation {id} not found"))?;
    match stored.get(P::Result).and_then(PropertyValue::as_result) {
        Some(ResultValue::Number(d)) => assert_eq!(d.to_string(), "21.50"),
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_result_columns_by_kind() -> anyhow::Result<()> {
    print_test_header(
        "test_result_columns_by_kind",
        &["Each result kind lands in its own column with the matching discriminator"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_, _, datastream_id) = weather_station(&session).await?;

    let cases = [
        (ResultValue::from(7), 0, "RESULT_NUMBER"),
        (ResultValue::from(true), 1, "RESULT_BOOLEAN"),
        (ResultValue::from("cloudy"), 2, "RESULT_STRING"),
        (ResultValue::Structured(json!({"wind": [3, 4]})), 3, "RESULT_JSON"),
    ];
    for (result, code, column) in cases {
        let id = long(&insert(&session, observation(&datastream_id, result.clone())).await?);
        let stored_code = scalar(&tx, &format!("SELECT RESULT_TYPE FROM OBSERVATIONS WHERE ID = {id}")).await?;
        let filled = scalar(
            &tx,
            &format!("SELECT COUNT(*) FROM OBSERVATIONS WHERE ID = {id} AND {column} IS NOT NULL"),
        )
        .await?;
        println!("   {result:?} -> RESULT_TYPE {stored_code}, {column}");
        assert_eq!(stored_code, code);
        assert_eq!(filled, 1);

        let stored = session
            .get(T::Observation, &Id::Long(id), &Query::new())
            .await?
            .ok_or_else(|| anyhow::anyhow!("observation {id} not found"))?;
        assert_eq!(stored.get(P::Result), Some(&PropertyValue::Result(result)));
    }
    println!("✅ all result kinds verified");
    Ok(())
}

#[tokio::test]
async fn test_update_changes_only_given_properties() -> anyhow::Result<()> {
    print_test_header(
        "test_update_changes_only_given_properties",
        &["A partial update touches the given property and reports it"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let id = insert(&session, thing("Fan")).await?;
    session.take_changes();
    let message = session
        .update(Entity::new(T::Thing).with(P::Name, "Ceiling fan"), &id)
        .await?;
    assert_eq!(message.kind, ChangeKind::Update);
    assert_eq!(message.changed, vec![Property::Entity(P::Name)]);

    let stored = session
        .get(T::Thing, &id, &Query::new())
        .await?
        .ok_or_else(|| anyhow::anyhow!("thing {id} not found"))?;
    assert_eq!(stored.get(P::Name).and_then(PropertyValue::as_text), Some("Ceiling fan"));
    assert_eq!(stored.get(P::Description).and_then(PropertyValue::as_text), Some("Fan description"));
    println!("✅ partial update verified");
    Ok(())
}

#[tokio::test]
async fn test_update_and_delete_of_missing_entities() -> anyhow::Result<()> {
    print_test_header(
        "test_update_and_delete_of_missing_entities",
        &["Unknown ids fail with NoSuchEntity", "a changed id fails with InvalidArgument"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let missing = Id::Long(999);
    let err = session
        .update(Entity::new(T::Thing).with(P::Name, "ghost"), &missing)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::NoSuchEntity { entity_type: T::Thing, .. }));

    let err = session.delete(T::Thing, &missing).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NoSuchEntity { .. }));

    let id = insert(&session, thing("Lamp")).await?;
    let err = session
        .update(Entity::new(T::Thing).with_id(Id::Long(long(&id) + 1)).with(P::Name, "x"), &id)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidArgument(_)));
    println!("✅ errors verified");
    Ok(())
}

#[tokio::test]
async fn test_delete_cascades_and_reports() -> anyhow::Result<()> {
    print_test_header(
        "test_delete_cascades_and_reports",
        &["Deleting a datastream removes its observations"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_, _, datastream_id) = weather_station(&session).await?;
    insert(&session, observation(&datastream_id, 1i64)).await?;
    insert(&session, observation(&datastream_id, 2i64)).await?;
    session.take_changes();

    session.delete(T::Datastream, &datastream_id).await?;
    assert_eq!(scalar(&tx, "SELECT COUNT(*) FROM OBSERVATIONS").await?, 0);

    let changes = session.take_changes();
    assert!(changes
        .iter()
        .any(|m| m.kind == ChangeKind::Delete && m.entity_type == T::Datastream && m.id == datastream_id));
    println!("✅ cascade verified");
    Ok(())
}

#[tokio::test]
async fn test_delete_where_filter() -> anyhow::Result<()> {
    print_test_header("test_delete_where_filter", &["Only observations matching the filter are deleted"]);
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_, _, datastream_id) = weather_station(&session).await?;
    for value in [5i64, 15, 25] {
        insert(&session, observation(&datastream_id, value)).await?;
    }

    let filter = Expression::compare(PropertyPath::property(P::Result), CompareOp::Gt, Literal::Integer(10));
    let deleted = session.delete_where(&QueryTarget::all(T::Observation), &filter).await?;
    assert_eq!(deleted, 2);
    assert_eq!(scalar(&tx, "SELECT COUNT(*) FROM OBSERVATIONS").await?, 1);
    println!("✅ deleted {deleted} observations");
    Ok(())
}

#[tokio::test]
async fn test_task_creation_time_defaults_to_now() -> anyhow::Result<()> {
    print_test_header("test_task_creation_time_defaults_to_now", &["Tasks are stamped on creation"]);
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let thing_id = insert(&session, thing("Valve")).await?;
    let actuator = Entity::new(T::Actuator)
        .with(P::Name, "Motor")
        .with(P::Description, "valve motor")
        .with(P::EncodingType, "application/pdf")
        .with(P::Metadata, "http://example.org/motor.pdf");
    let capability = Entity::new(T::TaskingCapability)
        .with(P::Name, "Open")
        .with(P::Description, "opens the valve")
        .with(P::TaskingParameters, json!({"type": "DataRecord", "field": []}))
        .with_one(N::Thing, Entity::reference(T::Thing, thing_id))
        .with_one(N::Actuator, actuator);
    let capability_id = insert(&session, capability).await?;

    let before = chrono::Utc::now();
    let task_id = insert(
        &session,
        Entity::new(T::Task)
            .with(P::TaskingParameters, json!({"open": true}))
            .with_one(N::TaskingCapability, Entity::reference(T::TaskingCapability, capability_id)),
    )
    .await?;
    let stored = session
        .get(T::Task, &task_id, &Query::new())
        .await?
        .ok_or_else(|| anyhow::anyhow!("task {task_id} not found"))?;
    let created = stored
        .get(P::CreationTime)
        .and_then(PropertyValue::as_time)
        .map(TimeValue::start)
        .ok_or_else(|| anyhow::anyhow!("task has no creation time"))?;
    assert!(created >= before - chrono::Duration::seconds(1));
    println!("✅ creation time {created}");
    Ok(())
}
