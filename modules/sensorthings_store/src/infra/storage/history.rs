//! Location history of things
//!
//! Changing which locations a thing is at records a HistoricalLocation stamped with
//! the current time, linked to the locations the thing moved to. An emptied location
//! set is recorded too, as a HistoricalLocation without locations.

use chrono::Utc;
use sea_orm::sea_query::{Alias, Expr, Query, SimpleExpr};

use crate::contract::{
    Entity, EntityProperty, EntitySet, EntityType, Id, NavProperty, PersistenceError,
    PersistenceResult,
};
use crate::domain::events::EntityChangedMessage;
use crate::domain::service::Session;

use super::converters::time_value;
use super::fields::ColumnValues;
use super::relation::{LinkMode, ManyToMany, Relation};
use super::sql::{self, ID_COLUMN};
use super::table::TableKind;
use super::tables::col;

pub(crate) fn many_to_many<'a>(session: &Session<'a>, owner: EntityType, nav: NavProperty) -> PersistenceResult<&'a ManyToMany> {
    match session.tables().main(owner).relation(nav)? {
        Relation::ManyToMany(r) => Ok(r),
        Relation::OneToMany(_) => Err(PersistenceError::Configuration(format!(
            "{owner}.{nav} must be a link-table relation"
        ))),
    }
}

/// Write the locations of `thing_id`, recording the move.
pub(crate) async fn link_locations_to_thing(
    session: &Session<'_>,
    relation: &ManyToMany,
    thing_id: &Id,
    locations: &EntitySet,
    mode: LinkMode,
) -> PersistenceResult<()> {
    let had_locations = match mode {
        LinkMode::Replace => relation.unlink_all(session, thing_id).await? > 0,
        LinkMode::Additive => false,
    };

    let factories = session.factories();
    let mut linked: Vec<Id> = Vec::new();
    for location in locations {
        let location_id = factories.entity_exists_or_create(location.clone()).await?;
        if linked.contains(&location_id) || relation.is_linked(session, thing_id, &location_id).await? {
            continue;
        }
        relation.insert_link(session, thing_id, &location_id).await?;
        linked.push(location_id);
    }

    if !linked.is_empty() || had_locations {
        create_historical_location(session, thing_id, &linked).await?;
    }
    Ok(())
}

/// Write the things at `location_id`, recording the move of every thing affected.
pub(crate) async fn link_things_to_location(
    session: &Session<'_>,
    relation: &ManyToMany,
    location_id: &Id,
    things: &EntitySet,
    mode: LinkMode,
) -> PersistenceResult<()> {
    let previous = match mode {
        LinkMode::Replace => {
            let previous = relation.linked_ids(session, location_id).await?;
            relation.unlink_all(session, location_id).await?;
            previous
        }
        LinkMode::Additive => Vec::new(),
    };

    let factories = session.factories();
    let mut linked: Vec<Id> = Vec::new();
    for thing in things {
        let thing_id = factories.entity_exists_or_create(thing.clone()).await?;
        if linked.contains(&thing_id) || relation.is_linked(session, location_id, &thing_id).await? {
            continue;
        }
        relation.insert_link(session, location_id, &thing_id).await?;
        let stayed = previous.contains(&thing_id);
        linked.push(thing_id.clone());
        if !stayed {
            create_historical_location(session, &thing_id, std::slice::from_ref(location_id)).await?;
        }
    }

    let thing_locations = many_to_many(session, EntityType::Thing, NavProperty::Locations)?;
    for thing_id in previous.iter().filter(|id| !linked.contains(id)) {
        let remaining = thing_locations.linked_ids(session, thing_id).await?;
        create_historical_location(session, thing_id, &remaining).await?;
    }
    Ok(())
}

/// Insert a HistoricalLocation of `thing_id` at the current time, linked to
/// `location_ids`.
///
/// The row is written directly, so the rules that run for HistoricalLocations created
/// by clients do not apply.
pub(crate) async fn create_historical_location(
    session: &Session<'_>,
    thing_id: &Id,
    location_ids: &[Id],
) -> PersistenceResult<Id> {
    let now = Utc::now();
    let mut row = ColumnValues::new();
    if let Some(id) = session.id_type().generate() {
        row.insert(ID_COLUMN.to_string(), sql::id_value(&id));
    }
    row.insert(col::TIME.to_string(), time_value(Some(now)));
    row.insert(col::THING_ID.to_string(), sql::id_value(thing_id));

    let (columns, values): (Vec<_>, Vec<_>) = row
        .iter()
        .map(|(column, value)| (Alias::new(column), SimpleExpr::from(value.clone())))
        .unzip();
    let mut insert = Query::insert();
    insert
        .into_table(Alias::new(TableKind::Main(EntityType::HistoricalLocation).name()))
        .columns(columns)
        .values(values)
        .map_err(|e| PersistenceError::internal(format!("historical location insert: {e}")))?
        .returning_col(Alias::new(ID_COLUMN));
    let returned = sql::query_one(session.tx(), &insert)
        .await?
        .ok_or_else(|| PersistenceError::internal("historical location insert returned no row"))?;
    let id = sql::require_id(&returned, ID_COLUMN, session.id_type())?;

    let location_history = many_to_many(session, EntityType::Location, NavProperty::HistoricalLocations)?;
    for location_id in location_ids {
        location_history.insert_link(session, location_id, &id).await?;
    }
    tracing::debug!(thing = %thing_id, historical_location = %id, locations = location_ids.len(), "recorded location change");

    let entity = Entity::new(EntityType::HistoricalLocation)
        .with_id(id.clone())
        .with(EntityProperty::Time, now)
        .with_one(NavProperty::Thing, Entity::reference(EntityType::Thing, thing_id.clone()))
        .with_many(
            NavProperty::Locations,
            location_ids
                .iter()
                .map(|l| Entity::reference(EntityType::Location, l.clone()))
                .collect(),
        );
    session.record_change(EntityChangedMessage::created(entity, id.clone()));
    Ok(id)
}

/// Make `location_ids` the current locations of `thing_id` without recording history.
pub(crate) async fn replace_thing_locations(
    session: &Session<'_>,
    thing_id: &Id,
    location_ids: &[Id],
) -> PersistenceResult<()> {
    let relation = many_to_many(session, EntityType::Thing, NavProperty::Locations)?;
    relation.unlink_all(session, thing_id).await?;
    for location_id in location_ids {
        relation.insert_link(session, thing_id, location_id).await?;
    }
    Ok(())
}

/// Delete the HistoricalLocations that would be left without any location once
/// `location_id` is gone.
pub(crate) async fn delete_orphaned_history(session: &Session<'_>, location_id: &Id) -> PersistenceResult<u64> {
    let link = TableKind::LocationsHistLocations.name();
    let mut candidates = Query::select();
    candidates
        .column(Alias::new(col::HIST_LOCATION_ID))
        .from(Alias::new(link))
        .and_where(sql::key_equals(col::LOCATION_ID, location_id));
    let id_type = session.id_type();
    let history_ids = sql::query_all(session.tx(), &candidates)
        .await?
        .iter()
        .map(|row| sql::require_id(row, col::HIST_LOCATION_ID, id_type))
        .collect::<PersistenceResult<Vec<_>>>()?;

    let table = session.tables().main(EntityType::HistoricalLocation);
    let mut deleted = 0;
    for history_id in history_ids {
        let mut others = Query::select();
        others
            .expr(Expr::val(1))
            .from(Alias::new(link))
            .and_where(sql::key_equals(col::HIST_LOCATION_ID, &history_id))
            .and_where(Expr::col(Alias::new(col::LOCATION_ID)).ne(sql::id_value(location_id)))
            .limit(1);
        if sql::query_one(session.tx(), &others).await?.is_some() {
            continue;
        }
        table.delete_from_database(session, &history_id).await?;
        deleted += 1;
    }
    if deleted > 0 {
        tracing::debug!(location = %location_id, deleted, "removed orphaned historical locations");
    }
    Ok(deleted)
}
