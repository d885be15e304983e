//! Observations belong to exactly one Datastream or MultiDatastream

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Func, Query};

use crate::contract::{
    Entity, EntityProperty, EntityType, Id, Link, NavProperty, PersistenceError,
    PersistenceResult, PropertyValue, TimeValue,
};
use crate::domain::service::Session;
use crate::infra::storage::fields::ColumnValues;
use crate::infra::storage::hooks::{HookPreInsert, HookPreUpdate, InsertPhase};
use crate::infra::storage::read;
use crate::infra::storage::sql;
use crate::infra::storage::tables::col;
use crate::infra::storage::{TableKind, TableRegistry};

use super::RULE_PRIORITY;

pub(super) fn install(registry: &mut TableRegistry) {
    let hooks = registry.main_mut(EntityType::Observation).hooks_mut();
    hooks.register_pre_insert(RULE_PRIORITY, Arc::new(ObservationInsert));
    hooks.register_pre_update(RULE_PRIORITY, Arc::new(StreamReconciliation));
}

fn exclusivity(has_datastream: bool, has_multi_datastream: bool) -> PersistenceResult<()> {
    match (has_datastream, has_multi_datastream) {
        (true, true) => Err(PersistenceError::invalid(
            "an observation belongs to a Datastream or a MultiDatastream, not both",
        )),
        (false, false) => Err(PersistenceError::incomplete(
            "an observation needs a Datastream or a MultiDatastream",
        )),
        _ => Ok(()),
    }
}

/// Stream the resolved insert row points at, and whether it is a MultiDatastream
fn stream_of(row: &ColumnValues) -> PersistenceResult<(Id, bool)> {
    let linked = |column: &str| row.get(column).and_then(sql::id_from_value);
    if let Some(id) = linked(col::DATASTREAM_ID) {
        return Ok((id, false));
    }
    if let Some(id) = linked(col::MULTI_DATASTREAM_ID) {
        return Ok((id, true));
    }
    Err(PersistenceError::incomplete("an observation needs a Datastream or a MultiDatastream"))
}

pub(super) async fn observed_property_count(session: &Session<'_>, multi_datastream: &Id) -> PersistenceResult<i64> {
    let mut select = Query::select();
    select
        .expr_as(Func::count(Expr::col(Alias::new(col::OBS_PROPERTY_ID))), Alias::new("N"))
        .from(Alias::new(TableKind::MultiDatastreamsObsProperties.name()))
        .and_where(sql::key_equals(col::MULTI_DATASTREAM_ID, multi_datastream));
    let row = sql::query_one(session.tx(), &select).await?;
    Ok(match row {
        Some(row) => row.try_get::<i64>("", "N")?,
        None => 0,
    })
}

async fn check_result_length(
    session: &Session<'_>,
    result: Option<&PropertyValue>,
    multi_datastream: &Id,
) -> PersistenceResult<()> {
    let Some(items) = result
        .and_then(PropertyValue::as_result)
        .and_then(|r| r.as_array())
    else {
        return Err(PersistenceError::invalid("observations of a MultiDatastream need an array result"));
    };
    let expected = observed_property_count(session, multi_datastream).await?;
    if i64::try_from(items.len()).ok() != Some(expected) {
        return Err(PersistenceError::invalid(format!(
            "result has {} values, MultiDatastream {multi_datastream} has {expected} observed properties",
            items.len()
        )));
    }
    Ok(())
}

struct ObservationInsert;

#[async_trait]
impl HookPreInsert for ObservationInsert {
    async fn pre_insert(
        &self,
        session: &Session<'_>,
        phase: InsertPhase,
        entity: &mut Entity,
        row: &mut ColumnValues,
    ) -> PersistenceResult<bool> {
        match phase {
            InsertPhase::PreRelations => {
                exclusivity(
                    entity.linked(NavProperty::Datastream).is_some(),
                    entity.linked(NavProperty::MultiDatastream).is_some(),
                )?;
                let phenomenon_time = entity.get(EntityProperty::PhenomenonTime);
                if phenomenon_time.map_or(true, PropertyValue::is_null) {
                    entity.set(EntityProperty::PhenomenonTime, TimeValue::now());
                }
            }
            InsertPhase::PostRelations => {
                let (stream_id, multi) = stream_of(row)?;
                let has_feature = row.get(col::FEATURE_ID).is_some_and(|v| !sql::is_null_value(v));
                if !has_feature {
                    let generated = session
                        .factories()
                        .generate_feature_of_interest(&stream_id, multi)
                        .await?;
                    if let Some(feature_id) = generated {
                        row.insert(col::FEATURE_ID.to_string(), sql::id_value(&feature_id));
                    }
                }
                if multi {
                    check_result_length(session, entity.get(EntityProperty::Result), &stream_id).await?;
                }
            }
        }
        Ok(true)
    }
}

/// Re-checks the stream rules against the stored observation when an update touches
/// its stream links or its result.
///
/// Setting one link to null while setting the other switches the observation between
/// a Datastream and a MultiDatastream. Whatever stream the observation ends up with, a
/// MultiDatastream still needs a result array of matching length.
struct StreamReconciliation;

/// Stream id a link points at after an update; the stored id when the update leaves it alone
fn stream_after<'e>(update: &'e Entity, stored: &'e Entity, nav: NavProperty) -> Option<&'e Id> {
    match update.link(nav) {
        None => stored.linked(nav).and_then(Entity::id),
        Some(Link::One(linked)) => linked.as_deref().and_then(Entity::id),
        Some(Link::Many(_)) => None,
    }
}

#[async_trait]
impl HookPreUpdate for StreamReconciliation {
    async fn pre_update(&self, session: &Session<'_>, entity: &mut Entity, id: &Id) -> PersistenceResult<()> {
        let links_changed =
            entity.is_link_set(NavProperty::Datastream) || entity.is_link_set(NavProperty::MultiDatastream);
        if !links_changed && !entity.is_set(EntityProperty::Result) {
            return Ok(());
        }
        let table = session.tables().main(EntityType::Observation);
        let Some(stored) = read::load_by_id(session, table, id).await? else {
            return Ok(());
        };
        if links_changed {
            let is_linked = |nav: NavProperty| match entity.link(nav) {
                None => stored.linked(nav).is_some(),
                Some(Link::One(linked)) => linked.is_some(),
                Some(Link::Many(_)) => true,
            };
            match (is_linked(NavProperty::Datastream), is_linked(NavProperty::MultiDatastream)) {
                (false, false) => {
                    return Err(PersistenceError::invalid(
                        "an observation can not lose both its Datastream and its MultiDatastream",
                    ));
                }
                (has_datastream, has_multi_datastream) => exclusivity(has_datastream, has_multi_datastream)?,
            }
        }
        if let Some(multi_datastream) = stream_after(entity, &stored, NavProperty::MultiDatastream) {
            let result = if entity.is_set(EntityProperty::Result) {
                entity.get(EntityProperty::Result)
            } else {
                stored.get(EntityProperty::Result)
            };
            check_result_length(session, result, multi_datastream).await?;
        }
        Ok(())
    }
}
