use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{Entity, EntityProperty, EntityType, PersistenceResult, TimeValue};
use crate::domain::service::Session;
use crate::infra::storage::fields::ColumnValues;
use crate::infra::storage::hooks::{HookPreInsert, InsertPhase};
use crate::infra::storage::TableRegistry;

use super::RULE_PRIORITY;

pub(super) fn install(registry: &mut TableRegistry) {
    registry
        .main_mut(EntityType::Task)
        .hooks_mut()
        .register_pre_insert(RULE_PRIORITY, Arc::new(CreationTimeDefault));
}

/// Tasks without a creation time are stamped with the insert time.
struct CreationTimeDefault;

#[async_trait]
impl HookPreInsert for CreationTimeDefault {
    async fn pre_insert(
        &self,
        _session: &Session<'_>,
        phase: InsertPhase,
        entity: &mut Entity,
        _row: &mut ColumnValues,
    ) -> PersistenceResult<bool> {
        let missing = entity
            .get(EntityProperty::CreationTime)
            .map_or(true, |v| v.is_null());
        if phase == InsertPhase::PreRelations && missing {
            entity.set(EntityProperty::CreationTime, TimeValue::now());
        }
        Ok(true)
    }
}
