use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Expr, Query};

use crate::contract::{
    Entity, EntityProperty, EntityType, Id, NavProperty, PersistenceError, PersistenceResult,
    PropertyValue,
};
use crate::domain::service::Session;
use crate::infra::storage::converters::time_value;
use crate::infra::storage::fields::ColumnValues;
use crate::infra::storage::history;
use crate::infra::storage::hooks::HookPostInsert;
use crate::infra::storage::sql::{self, ID_COLUMN};
use crate::infra::storage::tables::col;
use crate::infra::storage::{TableKind, TableRegistry};

use super::RULE_PRIORITY;

pub(super) fn install(registry: &mut TableRegistry) {
    registry
        .main_mut(EntityType::HistoricalLocation)
        .hooks_mut()
        .register_post_insert(RULE_PRIORITY, Arc::new(LatestHistoryWins));
}

/// A HistoricalLocation created by a client that is newer than every other entry of
/// its thing becomes the thing's current location set.
struct LatestHistoryWins;

impl LatestHistoryWins {
    async fn is_newest(session: &Session<'_>, thing_id: &Id, history_id: &Id, time: &PropertyValue) -> PersistenceResult<bool> {
        let Some(time) = time.as_time() else {
            return Err(PersistenceError::invalid("time of a HistoricalLocation must be a time instant"));
        };
        let mut newer = Query::select();
        newer
            .expr(Expr::val(1))
            .from(Alias::new(TableKind::Main(EntityType::HistoricalLocation).name()))
            .and_where(sql::key_equals(col::THING_ID, thing_id))
            .and_where(Expr::col(Alias::new(col::TIME)).gt(time_value(Some(time.start()))))
            .and_where(Expr::col(Alias::new(ID_COLUMN)).ne(sql::id_value(history_id)))
            .limit(1);
        Ok(sql::query_one(session.tx(), &newer).await?.is_none())
    }
}

#[async_trait]
impl HookPostInsert for LatestHistoryWins {
    async fn post_insert(&self, session: &Session<'_>, entity: &Entity, row: &ColumnValues) -> PersistenceResult<bool> {
        let Some(thing_id) = row.get(col::THING_ID).and_then(sql::id_from_value) else {
            return Ok(true);
        };
        let (Some(history_id), Some(time)) = (entity.id(), entity.get(EntityProperty::Time)) else {
            return Ok(true);
        };
        if !Self::is_newest(session, &thing_id, history_id, time).await? {
            tracing::debug!(thing = %thing_id, historical_location = %history_id, "older history entry, current locations kept");
            return Ok(true);
        }
        let locations = history::many_to_many(session, EntityType::HistoricalLocation, NavProperty::Locations)?
            .linked_ids(session, history_id)
            .await?;
        history::replace_thing_locations(session, &thing_id, &locations).await?;
        tracing::debug!(thing = %thing_id, locations = locations.len(), "current locations follow the newest history entry");
        Ok(true)
    }
}
