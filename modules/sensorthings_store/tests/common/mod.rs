//! Common test utilities: an in-memory database and entity builders

#![allow(dead_code)]

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseTransaction, DbBackend, Statement};
use sensorthings_store::{
    Entity, EntityProperty as P, EntityType as T, Id, NavProperty as N, PersistenceManager,
    PersistenceSettings, ResultValue, Session,
};
use serde_json::json;

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Manager over a fresh in-memory SQLite database with the schema installed.
///
/// A single pooled connection keeps the in-memory database alive and shared.
pub async fn manager_with(settings: PersistenceSettings) -> anyhow::Result<PersistenceManager> {
    init_tracing();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    let manager = PersistenceManager::new(db, settings)?;
    manager.install_schema().await?;
    Ok(manager)
}

pub async fn manager() -> anyhow::Result<PersistenceManager> {
    manager_with(PersistenceSettings::default()).await
}

/// Insert `entity` and return its id
pub async fn insert(session: &Session<'_>, entity: Entity) -> anyhow::Result<Id> {
    let stored = session
        .insert(entity)
        .await?
        .ok_or_else(|| anyhow::anyhow!("insert was vetoed"))?;
    stored.id().cloned().ok_or_else(|| anyhow::anyhow!("stored entity has no id"))
}

/// Single integer from a raw SQL statement
pub async fn scalar(tx: &DatabaseTransaction, sql: &str) -> anyhow::Result<i64> {
    let row = tx
        .query_one(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no row for {sql}"))?;
    Ok(row.try_get_by_index::<i64>(0)?)
}

pub fn long(id: &Id) -> i64 {
    match id {
        Id::Long(v) => *v,
        other => panic!("expected a long id, got {other:?}"),
    }
}

// ===== Builders =====

pub fn thing(name: &str) -> Entity {
    Entity::new(T::Thing)
        .with(P::Name, name)
        .with(P::Description, format!("{name} description"))
}

pub fn location(name: &str, lon: f64, lat: f64) -> Entity {
    Entity::new(T::Location)
        .with(P::Name, name)
        .with(P::Description, format!("{name} description"))
        .with(P::EncodingType, "application/geo+json")
        .with(P::Location, json!({"type": "Point", "coordinates": [lon, lat]}))
}

pub fn sensor(name: &str) -> Entity {
    Entity::new(T::Sensor)
        .with(P::Name, name)
        .with(P::Description, "sensor")
        .with(P::EncodingType, "application/pdf")
        .with(P::Metadata, "http://example.org/datasheet.pdf")
}

pub fn observed_property(name: &str) -> Entity {
    Entity::new(T::ObservedProperty)
        .with(P::Name, name)
        .with(P::Description, format!("{name} property"))
        .with(P::Definition, format!("http://example.org/{name}"))
}

pub fn datastream(name: &str, thing_id: &Id, sensor_id: &Id, observed_property_id: &Id) -> Entity {
    Entity::new(T::Datastream)
        .with(P::Name, name)
        .with(P::Description, format!("{name} stream"))
        .with(
            P::ObservationType,
            "http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_Measurement",
        )
        .with(
            P::UnitOfMeasurement,
            json!({"name": "degree Celsius", "symbol": "°C", "definition": "http://unitsofmeasure.org/ucum.html#para-30"}),
        )
        .with_one(N::Thing, Entity::reference(T::Thing, thing_id.clone()))
        .with_one(N::Sensor, Entity::reference(T::Sensor, sensor_id.clone()))
        .with_one(
            N::ObservedProperty,
            Entity::reference(T::ObservedProperty, observed_property_id.clone()),
        )
}

pub fn observation(datastream_id: &Id, result: impl Into<ResultValue>) -> Entity {
    let result: ResultValue = result.into();
    Entity::new(T::Observation)
        .with(P::Result, result)
        .with_one(N::Datastream, Entity::reference(T::Datastream, datastream_id.clone()))
}

/// Thing at one location with a datastream; returns (thing, location, datastream)
pub async fn weather_station(session: &Session<'_>) -> anyhow::Result<(Id, Id, Id)> {
    let thing_id = insert(
        session,
        thing("Weather station").with_many(N::Locations, vec![location("Roof", 8.4, 49.0)]),
    )
    .await?;
    let location_id = session
        .query(
            &sensorthings_store::QueryTarget::related(T::Thing, thing_id.clone(), N::Locations),
            &sensorthings_store::Query::new(),
        )
        .await?
        .ids()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("thing has no location"))?;
    let sensor_id = insert(session, sensor("DHT22")).await?;
    let property_id = insert(session, observed_property("temperature")).await?;
    let datastream_id = insert(session, datastream("Air temperature", &thing_id, &sensor_id, &property_id)).await?;
    Ok((thing_id, location_id, datastream_id))
}
