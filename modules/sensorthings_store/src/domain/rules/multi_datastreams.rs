use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{
    Entity, EntityProperty, EntityType, Id, NavProperty, PersistenceError, PersistenceResult,
    PropertyValue,
};
use crate::domain::service::Session;
use crate::infra::storage::fields::ColumnValues;
use crate::infra::storage::hooks::{HookPreInsert, HookPreUpdate, InsertPhase};
use crate::infra::storage::{read, TableRegistry};

use super::observations::observed_property_count;
use super::RULE_PRIORITY;

/// Observation type of every MultiDatastream
pub const COMPLEX_OBSERVATION: &str =
    "http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_ComplexObservation";

pub(super) fn install(registry: &mut TableRegistry) {
    let hooks = registry.main_mut(EntityType::MultiDatastream).hooks_mut();
    hooks.register_pre_insert(RULE_PRIORITY, Arc::new(MultiDatastreamInsert));
    hooks.register_pre_update(RULE_PRIORITY, Arc::new(MultiDatastreamUpdate));
}

fn array_len(entity: &Entity, property: EntityProperty) -> PersistenceResult<Option<usize>> {
    match entity.get(property) {
        None | Some(PropertyValue::Null) => Ok(None),
        Some(PropertyValue::Json(serde_json::Value::Array(items))) => Ok(Some(items.len())),
        Some(_) => Err(PersistenceError::invalid(format!("{property} must be an array"))),
    }
}

/// `multiObservationDataTypes`, `unitOfMeasurements` and the ObservedProperties
/// must describe the same number of result components.
fn check_counts(data_types: Option<usize>, units: Option<usize>, observed_properties: usize) -> PersistenceResult<()> {
    let (Some(data_types), Some(units)) = (data_types, units) else {
        return Ok(());
    };
    if data_types != units || units != observed_properties {
        return Err(PersistenceError::invalid(format!(
            "{data_types} data types, {units} units and {observed_properties} observed properties do not match"
        )));
    }
    Ok(())
}

fn check_component_counts(entity: &Entity) -> PersistenceResult<()> {
    let observed_properties = entity
        .linked_set(NavProperty::ObservedProperties)
        .map_or(0, |set| set.len());
    check_counts(
        array_len(entity, EntityProperty::MultiObservationDataTypes)?,
        array_len(entity, EntityProperty::UnitOfMeasurements)?,
        observed_properties,
    )
}

struct MultiDatastreamInsert;

#[async_trait]
impl HookPreInsert for MultiDatastreamInsert {
    async fn pre_insert(
        &self,
        _session: &Session<'_>,
        phase: InsertPhase,
        entity: &mut Entity,
        _row: &mut ColumnValues,
    ) -> PersistenceResult<bool> {
        if phase != InsertPhase::PreRelations {
            return Ok(true);
        }
        if !entity.is_set(EntityProperty::ObservationType) {
            entity.set(EntityProperty::ObservationType, COMPLEX_OBSERVATION);
        }
        check_component_counts(entity)?;
        Ok(true)
    }
}

/// Keeps the component counts in line when an update changes any of them.
struct MultiDatastreamUpdate;

#[async_trait]
impl HookPreUpdate for MultiDatastreamUpdate {
    async fn pre_update(&self, session: &Session<'_>, entity: &mut Entity, id: &Id) -> PersistenceResult<()> {
        let touched = entity.is_set(EntityProperty::MultiObservationDataTypes)
            || entity.is_set(EntityProperty::UnitOfMeasurements)
            || entity.is_link_set(NavProperty::ObservedProperties);
        if !touched {
            return Ok(());
        }
        let table = session.tables().main(EntityType::MultiDatastream);
        let Some(stored) = read::load_by_id(session, table, id).await? else {
            return Ok(());
        };
        let after = |property: EntityProperty| {
            if entity.is_set(property) {
                array_len(entity, property)
            } else {
                array_len(&stored, property)
            }
        };
        let observed_properties = match entity.linked_set(NavProperty::ObservedProperties) {
            Some(set) => set.len(),
            None => usize::try_from(observed_property_count(session, id).await?).unwrap_or_default(),
        };
        check_counts(
            after(EntityProperty::MultiObservationDataTypes)?,
            after(EntityProperty::UnitOfMeasurements)?,
            observed_properties,
        )
    }
}
