//! Location and FeatureOfInterest clean-up

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Query};

use crate::contract::{Entity, EntityProperty, EntityType, Id, PersistenceResult};
use crate::domain::service::Session;
use crate::infra::storage::history;
use crate::infra::storage::hooks::{HookPostUpdate, HookPreDelete};
use crate::infra::storage::sql::{self, ID_COLUMN};
use crate::infra::storage::tables::col;
use crate::infra::storage::{TableKind, TableRegistry};

use super::RULE_PRIORITY;

pub(super) fn install(registry: &mut TableRegistry) {
    let locations = registry.main_mut(EntityType::Location).hooks_mut();
    locations.register_pre_delete(RULE_PRIORITY, Arc::new(OrphanedHistoryCleanup));
    locations.register_post_update(RULE_PRIORITY, Arc::new(MovedLocation));

    registry
        .main_mut(EntityType::FeatureOfInterest)
        .hooks_mut()
        .register_pre_delete(RULE_PRIORITY, Arc::new(GeneratedFeatureRelease));
}

/// Clear `LOCATIONS.GEN_FOI_ID` on the rows matching `column = id`.
async fn forget_generated_feature(session: &Session<'_>, column: &str, id: &Id) -> PersistenceResult<u64> {
    let mut update = Query::update();
    update
        .table(Alias::new(TableKind::Main(EntityType::Location).name()))
        .value(Alias::new(col::GEN_FOI_ID), sql::null_id_value(session.id_type()))
        .and_where(sql::key_equals(column, id));
    Ok(sql::exec(session.tx(), &update).await?.rows_affected())
}

/// Deleting a location deletes the history entries that only pointed at it.
struct OrphanedHistoryCleanup;

#[async_trait]
impl HookPreDelete for OrphanedHistoryCleanup {
    async fn pre_delete(&self, session: &Session<'_>, id: &Id) -> PersistenceResult<()> {
        history::delete_orphaned_history(session, id).await?;
        Ok(())
    }
}

/// A moved location generates a fresh feature of interest for later observations.
struct MovedLocation;

#[async_trait]
impl HookPostUpdate for MovedLocation {
    async fn post_update(&self, session: &Session<'_>, entity: &Entity, id: &Id) -> PersistenceResult<()> {
        if entity.is_set(EntityProperty::Location) {
            forget_generated_feature(session, ID_COLUMN, id).await?;
        }
        Ok(())
    }
}

/// Locations stop pointing at a generated feature that is deleted.
struct GeneratedFeatureRelease;

#[async_trait]
impl HookPreDelete for GeneratedFeatureRelease {
    async fn pre_delete(&self, session: &Session<'_>, id: &Id) -> PersistenceResult<()> {
        let released = forget_generated_feature(session, col::GEN_FOI_ID, id).await?;
        if released > 0 {
            tracing::debug!(feature = %id, locations = released, "released generated feature of interest");
        }
        Ok(())
    }
}
