//! Filters, ordering, paging, expansion and read restrictions

mod common;

use std::sync::Arc;

use common::*;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sensorthings_store::infra::storage::table::TableRef;
use sensorthings_store::{
    CompareOp, Direction, EntityProperty as P, EntityType as T, Expression, Literal,
    NavProperty as N, PersistenceResult, Principal, PropertyPath, PropertyValue, Query, QueryTarget, ResultValue,
    SecurityWrapper, Session, TableModifier, TableRegistry,
};
use serde_json::json;

async fn five_things(session: &Session<'_>) -> anyhow::Result<()> {
    for n in 0..5 {
        insert(session, thing(&format!("T{n}")).with(P::Properties, json!({"n": n}))).await?;
    }
    Ok(())
}

fn names(set: &sensorthings_store::EntitySet) -> Vec<String> {
    set.iter()
        .filter_map(|e| e.get(P::Name).and_then(PropertyValue::as_text).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_filter_on_plain_and_json_properties() -> anyhow::Result<()> {
    print_test_header(
        "test_filter_on_plain_and_json_properties",
        &["Comparisons work on columns and inside JSON documents"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    five_things(&session).await?;
    let all = QueryTarget::all(T::Thing);

    let by_name = Query::new().filter(Expression::compare(
        PropertyPath::property(P::Name),
        CompareOp::Eq,
        Literal::String("T3".into()),
    ));
    assert_eq!(names(&session.query(&all, &by_name).await?), vec!["T3"]);

    let by_json = Query::new().filter(Expression::compare(
        PropertyPath::property(P::Properties).sub("n"),
        CompareOp::Ge,
        Literal::Integer(2),
    ));
    assert_eq!(session.count(&all, &by_json).await?, 3);

    let either = Query::new().filter(
        Expression::compare(PropertyPath::property(P::Name), CompareOp::Eq, Literal::String("T0".into())).or(
            Expression::compare(PropertyPath::property(P::Name), CompareOp::Eq, Literal::String("T4".into())),
        ),
    );
    assert_eq!(session.count(&all, &either).await?, 2);

    let negated = Query::new().filter(
        Expression::compare(PropertyPath::property(P::Name), CompareOp::Eq, Literal::String("T0".into())).negate(),
    );
    assert_eq!(session.count(&all, &negated).await?, 4);
    println!("✅ plain, JSON and boolean filters verified");
    Ok(())
}

#[tokio::test]
async fn test_text_matching_escapes_wildcards() -> anyhow::Result<()> {
    print_test_header(
        "test_text_matching_escapes_wildcards",
        &["An underscore in a contains filter matches only an underscore"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    insert(&session, thing("tank_1")).await?;
    insert(&session, thing("tankx1")).await?;
    let all = QueryTarget::all(T::Thing);

    let contains = Query::new().filter(Expression::Contains {
        path: PropertyPath::property(P::Name),
        value: "k_".into(),
    });
    assert_eq!(names(&session.query(&all, &contains).await?), vec!["tank_1"]);

    let starts = Query::new().filter(Expression::StartsWith {
        path: PropertyPath::property(P::Name),
        value: "tank".into(),
    });
    assert_eq!(session.count(&all, &starts).await?, 2);
    println!("✅ wildcards escaped");
    Ok(())
}

#[tokio::test]
async fn test_ordering_paging_and_count() -> anyhow::Result<()> {
    print_test_header(
        "test_ordering_paging_and_count",
        &["A page reports the full count and whether more entities follow"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    five_things(&session).await?;

    let page = session
        .query(
            &QueryTarget::all(T::Thing),
            &Query::new()
                .order_by(PropertyPath::property(P::Name), Direction::Desc)
                .skip(1)
                .top(2)
                .with_count(true),
        )
        .await?;
    println!("   page: {:?}", names(&page));
    assert_eq!(names(&page), vec!["T3", "T2"]);
    assert_eq!(page.count(), Some(5));
    assert!(page.has_more());

    let last = session
        .query(
            &QueryTarget::all(T::Thing),
            &Query::new()
                .order_by(PropertyPath::property(P::Name), Direction::Asc)
                .skip(3)
                .top(5),
        )
        .await?;
    assert_eq!(names(&last), vec!["T3", "T4"]);
    assert!(!last.has_more());
    assert_eq!(last.count(), None);
    println!("✅ paging verified");
    Ok(())
}

#[tokio::test]
async fn test_filter_through_navigation_and_related_targets() -> anyhow::Result<()> {
    print_test_header(
        "test_filter_through_navigation_and_related_targets",
        &["Observations can be filtered by their thing's name", "and listed below their datastream"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_, _, datastream_id) = weather_station(&session).await?;
    for value in [1i64, 2, 3] {
        insert(&session, observation(&datastream_id, value)).await?;
    }
    let other_thing = insert(&session, thing("Other")).await?;
    let other_sensor = insert(&session, sensor("Other sensor")).await?;
    let other_property = insert(&session, observed_property("humidity")).await?;
    let other_stream = insert(&session, datastream("Humidity", &other_thing, &other_sensor, &other_property)).await?;

    let by_thing = Query::new().filter(Expression::compare(
        PropertyPath::through([N::Datastream, N::Thing], P::Name),
        CompareOp::Eq,
        Literal::String("Weather station".into()),
    ));
    assert_eq!(session.count(&QueryTarget::all(T::Observation), &by_thing).await?, 3);

    let below = QueryTarget::related(T::Datastream, datastream_id.clone(), N::Observations);
    assert_eq!(session.count(&below, &Query::new()).await?, 3);
    let empty = QueryTarget::related(T::Datastream, other_stream, N::Observations);
    assert_eq!(session.count(&empty, &Query::new()).await?, 0);
    println!("✅ navigation filters and related targets verified");
    Ok(())
}

#[tokio::test]
async fn test_expand_with_nested_options() -> anyhow::Result<()> {
    print_test_header(
        "test_expand_with_nested_options",
        &["Expanded collections honour their own top and count"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (thing_id, _, datastream_id) = weather_station(&session).await?;
    for value in [10i64, 20, 30] {
        insert(&session, observation(&datastream_id, value)).await?;
    }

    let query = Query::new().expand(
        N::Datastreams,
        Query::new().expand(N::Observations, Query::new().top(2).with_count(true)),
    );
    let stored = session
        .get(T::Thing, &thing_id, &query)
        .await?
        .ok_or_else(|| anyhow::anyhow!("thing {thing_id} not found"))?;
    let datastreams = stored
        .linked_set(N::Datastreams)
        .ok_or_else(|| anyhow::anyhow!("datastreams not expanded"))?;
    assert_eq!(datastreams.len(), 1);
    let observations = datastreams
        .iter()
        .next()
        .and_then(|d| d.linked_set(N::Observations))
        .ok_or_else(|| anyhow::anyhow!("observations not expanded"))?;
    assert_eq!(observations.len(), 2);
    assert_eq!(observations.count(), Some(3));
    assert!(observations.has_more());
    println!("✅ nested expansion verified");
    Ok(())
}

#[tokio::test]
async fn test_unknown_navigation_in_filter_is_rejected() -> anyhow::Result<()> {
    print_test_header(
        "test_unknown_navigation_in_filter_is_rejected",
        &["Things have no Sensor navigation"],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;

    let bad = Query::new().filter(Expression::compare(
        PropertyPath::through([N::Sensor], P::Name),
        CompareOp::Eq,
        Literal::String("x".into()),
    ));
    let err = session.query(&QueryTarget::all(T::Thing), &bad).await.unwrap_err();
    println!("✅ rejected: {err}");
    assert!(matches!(err, sensorthings_store::PersistenceError::InvalidArgument(_)));
    Ok(())
}

/// Hides things named "secret" and their properties from everyone but admins
struct AdminOnlySecrets;

impl SecurityWrapper for AdminOnlySecrets {
    fn restrict(&self, table: &TableRef, principal: Option<&Principal>) -> Option<SimpleExpr> {
        if principal.is_some_and(|p| p.has_role("admin")) {
            return None;
        }
        Some(Expr::col(table.column("NAME")).ne("secret"))
    }

    fn hidden_properties(&self, principal: Option<&Principal>) -> Vec<P> {
        if principal.is_some_and(|p| p.has_role("admin")) {
            Vec::new()
        } else {
            vec![P::Properties]
        }
    }
}

struct SecretThings;

impl TableModifier for SecretThings {
    fn name(&self) -> &str {
        "secret-things"
    }

    fn modify_tables(&self, tables: &mut TableRegistry) -> PersistenceResult<()> {
        tables.main_mut(T::Thing).set_security_wrapper(Arc::new(AdminOnlySecrets));
        Ok(())
    }
}

#[tokio::test]
async fn test_security_wrapper_restricts_reads() -> anyhow::Result<()> {
    print_test_header(
        "test_security_wrapper_restricts_reads",
        &["Restricted rows and hidden properties depend on the principal"],
    );
    let manager = manager().await?;
    manager.register_modifier(Arc::new(SecretThings))?;
    let tx = manager.begin().await?;

    let admin = manager.session(&tx, Some(Principal::new("root", ["admin"])))?;
    insert(&admin, thing("public").with(P::Properties, json!({"a": 1}))).await?;
    let secret = insert(&admin, thing("secret")).await?;
    assert_eq!(admin.count(&QueryTarget::all(T::Thing), &Query::new()).await?, 2);

    let guest = manager.session(&tx, Some(Principal::new("guest", Vec::<String>::new())))?;
    let visible = guest.query(&QueryTarget::all(T::Thing), &Query::new()).await?;
    assert_eq!(names(&visible), vec!["public"]);
    assert!(visible.iter().all(|e| !e.is_set(P::Properties)));
    assert!(guest.get(T::Thing, &secret, &Query::new()).await?.is_none());
    println!("✅ guest sees one thing without properties");

    let err = manager.register_modifier(Arc::new(SecretThings)).unwrap_err();
    assert!(matches!(err, sensorthings_store::PersistenceError::Configuration(_)));
    Ok(())
}

#[tokio::test]
async fn test_security_wrapper_covers_parents_and_filter_paths() -> anyhow::Result<()> {
    print_test_header(
        "test_security_wrapper_covers_parents_and_filter_paths",
        &[
            "Entities below a hidden thing are not reachable through it",
            "and filters can not look through a hidden thing",
        ],
    );
    let manager = manager().await?;
    manager.register_modifier(Arc::new(SecretThings))?;
    let tx = manager.begin().await?;

    let admin = manager.session(&tx, Some(Principal::new("root", ["admin"])))?;
    let secret = insert(&admin, thing("secret").with_many(N::Locations, vec![location("Bunker", 1.0, 2.0)])).await?;
    let sensor_id = insert(&admin, sensor("Hidden sensor")).await?;
    let property_id = insert(&admin, observed_property("pressure")).await?;
    let datastream_id = insert(&admin, datastream("Pressure", &secret, &sensor_id, &property_id)).await?;
    insert(&admin, observation(&datastream_id, 4i64)).await?;
    let below_secret = QueryTarget::related(T::Thing, secret.clone(), N::Datastreams);
    let by_secret_name = Query::new().filter(Expression::compare(
        PropertyPath::through([N::Thing], P::Name),
        CompareOp::Eq,
        Literal::String("secret".into()),
    ));
    assert_eq!(admin.count(&below_secret, &Query::new()).await?, 1);
    assert_eq!(admin.count(&QueryTarget::all(T::Datastream), &by_secret_name).await?, 1);

    let guest = manager.session(&tx, None)?;
    assert_eq!(guest.query(&below_secret, &Query::new()).await?.len(), 0);
    assert_eq!(guest.count(&below_secret, &Query::new()).await?, 0);
    assert_eq!(guest.count(&QueryTarget::all(T::Datastream), &by_secret_name).await?, 0);
    let by_station = Query::new().filter(Expression::compare(
        PropertyPath::through([N::Datastream, N::Thing], P::Name),
        CompareOp::Eq,
        Literal::String("secret".into()),
    ));
    assert_eq!(guest.count(&QueryTarget::all(T::Observation), &by_station).await?, 0);
    let locations = QueryTarget::related(T::Thing, secret, N::Locations);
    assert_eq!(admin.count(&locations, &Query::new()).await?, 1);
    assert_eq!(guest.count(&locations, &Query::new()).await?, 0);

    // the datastream itself is not restricted
    assert_eq!(guest.count(&QueryTarget::all(T::Datastream), &Query::new()).await?, 1);
    println!("✅ hidden parent and filter path verified");
    Ok(())
}

#[tokio::test]
async fn test_update_of_hidden_entity_reports_full_state() -> anyhow::Result<()> {
    print_test_header(
        "test_update_of_hidden_entity_reports_full_state",
        &["Updating a row the principal can not read still reports the stored entity"],
    );
    let manager = manager().await?;
    manager.register_modifier(Arc::new(SecretThings))?;
    let tx = manager.begin().await?;

    let admin = manager.session(&tx, Some(Principal::new("root", ["admin"])))?;
    let secret = insert(&admin, thing("secret").with(P::Properties, json!({"vault": 7}))).await?;

    let guest = manager.session(&tx, None)?;
    let message = guest
        .update(
            sensorthings_store::Entity::new(T::Thing).with(P::Description, "relabelled"),
            &secret,
        )
        .await?;
    let stored = message
        .entity
        .ok_or_else(|| anyhow::anyhow!("update message carries no entity"))?;
    assert_eq!(stored.get(P::Description).and_then(PropertyValue::as_text), Some("relabelled"));
    assert!(stored.is_set(P::Properties));
    assert!(guest.get(T::Thing, &secret, &Query::new()).await?.is_none());
    println!("✅ update message carries the unrestricted state");
    Ok(())
}

#[tokio::test]
async fn test_result_filters_respect_the_stored_kind() -> anyhow::Result<()> {
    print_test_header(
        "test_result_filters_respect_the_stored_kind",
        &[
            "Only missing or JSON null results equal null",
            "text filters on results never match numbers",
        ],
    );
    let manager = manager().await?;
    let tx = manager.begin().await?;
    let session = manager.session(&tx, None)?;
    let (_, _, datastream_id) = weather_station(&session).await?;
    insert(&session, observation(&datastream_id, ResultValue::Structured(json!([1, 2, 3])))).await?;
    insert(&session, observation(&datastream_id, ResultValue::Structured(json!({"a": 1})))).await?;
    insert(&session, observation(&datastream_id, 42i64)).await?;
    insert(&session, observation(&datastream_id, "42")).await?;
    insert(&session, observation(&datastream_id, "x4y")).await?;
    insert(&session, observation(&datastream_id, ResultValue::Structured(serde_json::Value::Null))).await?;
    let all = QueryTarget::all(T::Observation);
    let result = || PropertyPath::property(P::Result);

    let is_null = Query::new().filter(Expression::compare(result(), CompareOp::Eq, Literal::Null));
    assert_eq!(session.count(&all, &is_null).await?, 1);
    let not_null = Query::new().filter(Expression::compare(result(), CompareOp::Ne, Literal::Null));
    assert_eq!(session.count(&all, &not_null).await?, 5);
    println!("✅ null comparisons verified");

    let text = Query::new().filter(Expression::compare(result(), CompareOp::Eq, Literal::String("42".into())));
    assert_eq!(session.count(&all, &text).await?, 1);
    let number = Query::new().filter(Expression::compare(result(), CompareOp::Eq, Literal::Integer(42)));
    assert_eq!(session.count(&all, &number).await?, 1);
    let contains = Query::new().filter(Expression::Contains {
        path: result(),
        value: "4".into(),
    });
    assert_eq!(session.count(&all, &contains).await?, 2);
    println!("✅ text filters only see string results");
    Ok(())
}
