//! Table descriptors
//!
//! A [`TableDescriptor`] owns everything known about one physical table: its
//! property fields, its relations, its hooks and the optional security wrapper.
//! Statements refer to tables through [`TableRef`], a (kind, alias) pair, so one
//! descriptor can appear several times in one statement.

use std::collections::BTreeMap;
use std::sync::Arc;

use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use sea_orm::{QueryResult, Value};

use crate::contract::{EntityType, NavProperty, PersistenceError, PersistenceResult};

use super::fields::PropertyFieldRegistry;
use super::hooks::HookRegistry;
use super::relation::{OneToMany, Relation};
use super::security::SecurityWrapper;
use super::sql::ID_COLUMN;

/// Identity of a physical table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Main(EntityType),
    ThingsLocations,
    LocationsHistLocations,
    MultiDatastreamsObsProperties,
}

impl TableKind {
    /// Number of tables
    pub const COUNT: usize = EntityType::ALL.len() + 3;

    pub fn all() -> impl Iterator<Item = TableKind> {
        EntityType::ALL.into_iter().map(TableKind::Main).chain([
            TableKind::ThingsLocations,
            TableKind::LocationsHistLocations,
            TableKind::MultiDatastreamsObsProperties,
        ])
    }

    /// Dense index for arena storage
    pub fn index(self) -> usize {
        match self {
            Self::Main(t) => EntityType::ALL.iter().position(|e| *e == t).unwrap_or_default(),
            Self::ThingsLocations => EntityType::ALL.len(),
            Self::LocationsHistLocations => EntityType::ALL.len() + 1,
            Self::MultiDatastreamsObsProperties => EntityType::ALL.len() + 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Main(EntityType::Thing) => "THINGS",
            Self::Main(EntityType::Location) => "LOCATIONS",
            Self::Main(EntityType::HistoricalLocation) => "HIST_LOCATIONS",
            Self::Main(EntityType::Datastream) => "DATASTREAMS",
            Self::Main(EntityType::MultiDatastream) => "MULTI_DATASTREAMS",
            Self::Main(EntityType::Observation) => "OBSERVATIONS",
            Self::Main(EntityType::ObservedProperty) => "OBS_PROPERTIES",
            Self::Main(EntityType::Sensor) => "SENSORS",
            Self::Main(EntityType::FeatureOfInterest) => "FEATURES",
            Self::Main(EntityType::Actuator) => "ACTUATORS",
            Self::Main(EntityType::Task) => "TASKS",
            Self::Main(EntityType::TaskingCapability) => "TASKINGCAPABILITIES",
            Self::ThingsLocations => "THINGS_LOCATIONS",
            Self::LocationsHistLocations => "LOCATIONS_HIST_LOCATIONS",
            Self::MultiDatastreamsObsProperties => "MULTI_DATASTREAMS_OBS_PROPERTIES",
        }
    }

    pub fn entity_type(self) -> Option<EntityType> {
        match self {
            Self::Main(t) => Some(t),
            _ => None,
        }
    }
}

/// A table as it appears in one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    kind: TableKind,
    alias: String,
}

impl TableRef {
    pub fn new(kind: TableKind, alias: impl Into<String>) -> Self {
        Self {
            kind,
            alias: alias.into(),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table_name(&self) -> Alias {
        Alias::new(self.kind.name())
    }

    pub fn alias_iden(&self) -> Alias {
        Alias::new(&self.alias)
    }

    /// Qualified column reference
    pub fn column(&self, column: &str) -> (Alias, Alias) {
        (Alias::new(&self.alias), Alias::new(column))
    }

    pub fn col(&self, column: &str) -> SimpleExpr {
        Expr::col(self.column(column)).into()
    }
}

/// SQL type of an extension column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraColumnKind {
    Text,
    BigInt,
    Double,
    Boolean,
    /// JSON document stored as text
    Json,
}

/// Deployment-specific column exposed as an entity extension of the same name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraColumn {
    pub name: String,
    pub kind: ExtraColumnKind,
}

impl ExtraColumn {
    pub fn new(name: impl Into<String>, kind: ExtraColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn read(&self, row: &QueryResult) -> PersistenceResult<serde_json::Value> {
        let column = self.name.as_str();
        let value = match self.kind {
            ExtraColumnKind::Text => row.try_get::<Option<String>>("", column)?.map(serde_json::Value::from),
            ExtraColumnKind::BigInt => row.try_get::<Option<i64>>("", column)?.map(serde_json::Value::from),
            ExtraColumnKind::Double => row.try_get::<Option<f64>>("", column)?.map(serde_json::Value::from),
            ExtraColumnKind::Boolean => row.try_get::<Option<bool>>("", column)?.map(serde_json::Value::from),
            ExtraColumnKind::Json => row
                .try_get::<Option<String>>("", column)?
                .map(|text| serde_json::from_str(&text))
                .transpose()
                .map_err(|e| PersistenceError::internal(format!("column {column} holds invalid JSON: {e}")))?,
        };
        Ok(value.unwrap_or(serde_json::Value::Null))
    }

    pub fn bind(&self, value: &serde_json::Value) -> PersistenceResult<Value> {
        let mismatch = || PersistenceError::invalid(format!("unexpected value for {}: {value}", self.name));
        if value.is_null() {
            return Ok(match self.kind {
                ExtraColumnKind::Text | ExtraColumnKind::Json => Value::String(None),
                ExtraColumnKind::BigInt => Value::BigInt(None),
                ExtraColumnKind::Double => Value::Double(None),
                ExtraColumnKind::Boolean => Value::Bool(None),
            });
        }
        Ok(match self.kind {
            ExtraColumnKind::Text => Value::from(value.as_str().ok_or_else(mismatch)?.to_string()),
            ExtraColumnKind::BigInt => Value::from(value.as_i64().ok_or_else(mismatch)?),
            ExtraColumnKind::Double => Value::from(value.as_f64().ok_or_else(mismatch)?),
            ExtraColumnKind::Boolean => Value::from(value.as_bool().ok_or_else(mismatch)?),
            ExtraColumnKind::Json => Value::from(value.to_string()),
        })
    }
}

/// Everything known about one table
pub struct TableDescriptor {
    kind: TableKind,
    relations: BTreeMap<NavProperty, Relation>,
    fields: PropertyFieldRegistry,
    hooks: HookRegistry,
    extra_columns: Vec<ExtraColumn>,
    security: Option<Arc<dyn SecurityWrapper>>,
}

impl TableDescriptor {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            relations: BTreeMap::new(),
            fields: PropertyFieldRegistry::new(),
            hooks: HookRegistry::default(),
            extra_columns: Vec::new(),
            security: None,
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn entity_type(&self) -> PersistenceResult<EntityType> {
        self.kind
            .entity_type()
            .ok_or_else(|| PersistenceError::internal(format!("{} is a link table", self.name())))
    }

    /// A view of this table under `alias`
    pub fn as_alias(&self, alias: impl Into<String>) -> TableRef {
        TableRef::new(self.kind, alias)
    }

    pub fn fields(&self) -> &PropertyFieldRegistry {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut PropertyFieldRegistry {
        &mut self.fields
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.insert(relation.name(), relation);
    }

    pub fn relation(&self, nav: NavProperty) -> PersistenceResult<&Relation> {
        self.relations
            .get(&nav)
            .ok_or_else(|| PersistenceError::invalid(format!("{} has no relation {nav}", self.name())))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// To-one relations whose foreign key lives in this table
    pub fn foreign_keys(&self) -> impl Iterator<Item = &OneToMany> {
        self.relations.values().filter_map(|r| match r {
            Relation::OneToMany(o) if o.source_field != ID_COLUMN => Some(o),
            _ => None,
        })
    }

    pub fn add_extra_column(&mut self, column: ExtraColumn) {
        self.extra_columns.retain(|c| c.name != column.name);
        self.extra_columns.push(column);
    }

    pub fn extra_columns(&self) -> &[ExtraColumn] {
        &self.extra_columns
    }

    pub fn extra_column(&self, name: &str) -> Option<&ExtraColumn> {
        self.extra_columns.iter().find(|c| c.name == name)
    }

    /// Install the security wrapper. A table has at most one; a second one is refused.
    pub fn set_security_wrapper(&mut self, wrapper: Arc<dyn SecurityWrapper>) {
        if self.security.is_some() {
            tracing::error!(table = self.name(), "security wrapper already set, ignoring the new one");
            return;
        }
        self.security = Some(wrapper);
    }

    pub fn security_wrapper(&self) -> Option<&Arc<dyn SecurityWrapper>> {
        self.security.as_ref()
    }

    /// Check that every navigation property of the entity type has a relation.
    pub fn validate(&self) -> PersistenceResult<()> {
        let Some(entity_type) = self.kind.entity_type() else {
            return Ok(());
        };
        for nav in entity_type.navigation_properties() {
            let Some(relation) = self.relations.get(nav) else {
                return Err(PersistenceError::Configuration(format!(
                    "{} lacks a relation for {nav}",
                    self.name()
                )));
            };
            if relation.target() != nav.target() {
                return Err(PersistenceError::Configuration(format!(
                    "relation {nav} of {} points at {}",
                    self.name(),
                    relation.target().name()
                )));
            }
        }
        for property in entity_type.entity_properties() {
            if *property != crate::contract::EntityProperty::Id && !self.fields.contains(*property) {
                return Err(PersistenceError::Configuration(format!(
                    "{} has no fields for {property}",
                    self.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indexes_are_dense_and_unique() {
        let mut seen: Vec<usize> = TableKind::all().map(TableKind::index).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..TableKind::COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn extra_columns_reject_mismatched_values() {
        let column = ExtraColumn::new("PRIORITY", ExtraColumnKind::BigInt);
        assert_eq!(column.bind(&json!(3)).unwrap(), Value::from(3i64));
        assert_eq!(column.bind(&json!(null)).unwrap(), Value::BigInt(None));
        assert!(column.bind(&json!("high")).is_err());
    }

    #[test]
    fn missing_relation_fails_validation() {
        let table = TableDescriptor::new(TableKind::Main(EntityType::Task));
        assert!(matches!(table.validate(), Err(PersistenceError::Configuration(_))));
    }
}
