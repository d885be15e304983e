//! String and UUID identifiers, client supplied ids

mod common;

use common::*;
use sensorthings_store::{
    EntityType as T, Id, IdGenerationMode, IdType, NavProperty as N, PersistenceError,
    PersistenceSettings, Query, QueryTarget,
};

#[tokio::test]
async fn test_uuid_ids_are_generated_in_process() -> anyhow::Result<()> {
    print_test_header(
        "test_uuid_ids_are_generated_in_process",
        &["With UUID keys every table, link table and history entry works the same"],
    );
    let settings: PersistenceSettings = serde_yaml::from_str("id_type: uuid\n")?;
    let manager = manager_with(settings).await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let thing_id = insert(&session, thing("Tracker").with_many(N::Locations, vec![location("Hangar", 2.0, 3.0)])).await?;
    assert!(matches!(thing_id, Id::Uuid(_)));

    let history = session
        .query(
            &QueryTarget::related(T::Thing, thing_id.clone(), N::HistoricalLocations),
            &Query::new().expand(N::Locations, Query::new()),
        )
        .await?;
    assert_eq!(history.len(), 1);
    assert!(history.ids().iter().all(|id| id.id_type() == IdType::Uuid));
    assert!(session.get(T::Thing, &thing_id, &Query::new()).await?.is_some());
    println!("✅ thing {thing_id} and its history use uuid keys");
    Ok(())
}

#[tokio::test]
async fn test_client_supplied_string_ids() -> anyhow::Result<()> {
    print_test_header(
        "test_client_supplied_string_ids",
        &["Client ids are kept when allowed", "and required when only clients assign them"],
    );
    let mixed = PersistenceSettings {
        id_type: IdType::String,
        id_generation_mode: IdGenerationMode::ServerAndClientGenerated,
        ..Default::default()
    };
    let manager = manager_with(mixed).await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let named = insert(&session, thing("Boiler").with_id("boiler-1")).await?;
    assert_eq!(named, Id::String("boiler-1".into()));
    let generated = insert(&session, thing("Chiller")).await?;
    assert!(matches!(generated, Id::String(ref s) if !s.is_empty()));

    let err = session.insert(thing("Wrong").with_id(7i64)).await.unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidArgument(_)));
    println!("✅ mixed mode verified");

    let client_only = PersistenceSettings {
        id_type: IdType::String,
        id_generation_mode: IdGenerationMode::ClientGeneratedOnly,
        ..Default::default()
    };
    let manager = manager_with(client_only).await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let err = session.insert(thing("Anonymous")).await.unwrap_err();
    assert!(matches!(err, PersistenceError::IncompleteEntity(_)));

    let server_only = manager_with(PersistenceSettings::default()).await?;
    let tx = server_only.begin().await?;
    let session = server_only.session(&tx, None)?;
    let err = session.insert(thing("Pinned").with_id(5i64)).await.unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidArgument(_)));
    println!("✅ client-only and server-only modes verified");
    Ok(())
}
