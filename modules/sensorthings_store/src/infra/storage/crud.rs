//! Insert, update and delete of one entity

use sea_orm::sea_query::{Alias, Query, SimpleExpr};

use crate::config::IdGenerationMode;
use crate::contract::{
    Entity, EntityProperty, EntityType, Id, Link, PersistenceError, PersistenceResult, Property,
    PropertyValue,
};
use crate::domain::events::EntityChangedMessage;
use crate::domain::service::Session;

use super::fields::{ChangeRecord, ColumnValues, DataSize};
use super::hooks::InsertPhase;
use super::read;
use super::relation::{LinkMode, Relation};
use super::sql::{self, ID_COLUMN};
use super::table::TableDescriptor;

fn column_exprs(row: &ColumnValues) -> impl Iterator<Item = (Alias, SimpleExpr)> + '_ {
    row.iter()
        .map(|(column, value)| (Alias::new(column), SimpleExpr::from(value.clone())))
}

fn is_missing(entity: &Entity, property: EntityProperty) -> bool {
    match entity.get(property) {
        None => !entity.is_set(property),
        // a null result is a valid (structured) result
        Some(PropertyValue::Null) => property != EntityProperty::Result,
        Some(_) => false,
    }
}

impl TableDescriptor {
    fn check_entity_type(&self, entity: &Entity) -> PersistenceResult<EntityType> {
        let entity_type = self.entity_type()?;
        if entity.entity_type() != entity_type {
            return Err(PersistenceError::invalid(format!(
                "{} can not be stored in {}",
                entity.entity_type(),
                self.name()
            )));
        }
        Ok(entity_type)
    }

    /// Identifier to insert, or `None` when the database assigns it.
    fn insert_id(&self, session: &Session<'_>, entity: &Entity) -> PersistenceResult<Option<Id>> {
        let id_type = session.id_type();
        match (entity.id(), session.settings().id_generation_mode) {
            (Some(_), IdGenerationMode::ServerGeneratedOnly) => Err(PersistenceError::invalid(format!(
                "ids of new {} entities are assigned by the server",
                entity.entity_type()
            ))),
            (Some(id), _) if !id_type.accepts(id) => {
                Err(PersistenceError::invalid(format!("id {id} is not of type {id_type:?}")))
            }
            (Some(id), _) => Ok(Some(id.clone())),
            (None, IdGenerationMode::ClientGeneratedOnly) => Err(PersistenceError::incomplete(format!(
                "new {} entities need a client supplied id",
                entity.entity_type()
            ))),
            (None, _) => Ok(id_type.generate()),
        }
    }

    fn extension_values(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()> {
        for (name, value) in entity.extensions() {
            let column = self
                .extra_column(name)
                .ok_or_else(|| PersistenceError::invalid(format!("{} has no property {name}", self.name())))?;
            row.insert(column.name.clone(), column.bind(value)?);
            changes.record(Property::Extension(name.clone()));
        }
        Ok(())
    }

    /// Create `entity`, linked entities included.
    ///
    /// Returns the stored entity with the `select`ed properties (all when empty), or
    /// `None` when a hook vetoed the insert.
    pub async fn insert_into_database(
        &self,
        session: &Session<'_>,
        mut entity: Entity,
        select: &[EntityProperty],
    ) -> PersistenceResult<Option<Entity>> {
        let entity_type = self.check_entity_type(&entity)?;
        let mut row = ColumnValues::new();

        for hook in self.hooks().pre_insert.iter() {
            if !hook.pre_insert(session, InsertPhase::PreRelations, &mut entity, &mut row).await? {
                tracing::debug!(%entity_type, "insert vetoed before relations");
                return Ok(None);
            }
        }

        for nav in entity_type.navigation_properties().iter().filter(|n| !n.is_set()) {
            let Some(link) = entity.link(*nav) else {
                continue;
            };
            let (column, value) = self.relation(*nav)?.resolve_to_one(session, link, true).await?;
            row.insert(column.to_string(), value);
        }

        for hook in self.hooks().pre_insert.iter() {
            if !hook.pre_insert(session, InsertPhase::PostRelations, &mut entity, &mut row).await? {
                tracing::debug!(%entity_type, "insert vetoed after relations");
                return Ok(None);
            }
        }

        for nav in entity_type.required_navigation() {
            let column = match self.relation(*nav)? {
                Relation::OneToMany(r) => r.source_field,
                Relation::ManyToMany(_) => continue,
            };
            if row.get(column).map_or(true, sql::is_null_value) {
                return Err(PersistenceError::incomplete(format!("{entity_type} needs a {nav}")));
            }
        }

        if let Some(id) = self.insert_id(session, &entity)? {
            row.insert(ID_COLUMN.to_string(), sql::id_value(&id));
        }

        for property in entity_type.required_properties() {
            if is_missing(&entity, *property) {
                return Err(PersistenceError::incomplete(format!("{entity_type} needs {property}")));
            }
        }
        for entry in self.fields().entries() {
            if entity.is_set(entry.property) {
                entry.converter.to_insert(&entity, &mut row)?;
            }
        }
        self.extension_values(&entity, &mut row, &mut ChangeRecord::default())?;

        let mut insert = Query::insert();
        insert.into_table(Alias::new(self.name()));
        if row.is_empty() {
            insert.or_default_values();
        } else {
            let (columns, values): (Vec<_>, Vec<_>) = column_exprs(&row).unzip();
            insert
                .columns(columns)
                .values(values)
                .map_err(|e| PersistenceError::internal(format!("insert into {}: {e}", self.name())))?;
        }
        insert.returning_all();
        let returned = sql::query_one(session.tx(), &insert)
            .await?
            .ok_or_else(|| PersistenceError::internal(format!("insert into {} returned no row", self.name())))?;
        let id = sql::require_id(&returned, ID_COLUMN, session.id_type())?;
        entity.set_id(id.clone());
        tracing::debug!(%entity_type, %id, "inserted");

        for nav in entity_type.navigation_properties().iter().filter(|n| n.is_set()) {
            if let Some(Link::Many(set)) = entity.link(*nav) {
                self.relation(*nav)?
                    .link_set(session, &id, set, LinkMode::Additive)
                    .await?;
            }
        }

        for hook in self.hooks().post_insert.iter() {
            if !hook.post_insert(session, &entity, &row).await? {
                tracing::debug!(%entity_type, %id, "insert vetoed after the row was written");
                return Ok(None);
            }
        }

        let mut size = DataSize::unlimited();
        let stored = read::materialize(self, &returned, select, session.id_type(), &mut size)?;
        session.record_change(EntityChangedMessage::created(stored.clone(), id));
        Ok(Some(stored))
    }

    /// Apply the properties and links set on `entity` to the entity `id`.
    pub async fn update_in_database(
        &self,
        session: &Session<'_>,
        mut entity: Entity,
        id: &Id,
    ) -> PersistenceResult<EntityChangedMessage> {
        let entity_type = self.check_entity_type(&entity)?;
        if let Some(given) = entity.id() {
            if given != id {
                return Err(PersistenceError::invalid(format!("the id of {entity_type} {id} can not be changed")));
            }
        }
        if !session.factories().exists(entity_type, id).await? {
            return Err(PersistenceError::no_such_entity(entity_type, id));
        }

        for hook in self.hooks().pre_update.iter() {
            hook.pre_update(session, &mut entity, id).await?;
        }

        let mut row = ColumnValues::new();
        let mut changes = ChangeRecord::default();
        for nav in entity_type.navigation_properties().iter().filter(|n| !n.is_set()) {
            let Some(link) = entity.link(*nav) else {
                continue;
            };
            let (column, value) = self.relation(*nav)?.resolve_to_one(session, link, false).await?;
            if sql::is_null_value(&value) && entity_type.required_navigation().contains(nav) {
                return Err(PersistenceError::incomplete(format!("{entity_type} can not lose its {nav}")));
            }
            row.insert(column.to_string(), value);
            changes.record(*nav);
        }

        for entry in self.fields().entries() {
            let required = entity_type.required_properties().contains(&entry.property);
            if required && entity.is_set(entry.property) && is_missing(&entity, entry.property) {
                return Err(PersistenceError::incomplete(format!(
                    "{} of {entity_type} can not be null",
                    entry.property
                )));
            }
            entry.converter.to_update(&entity, &mut row, &mut changes)?;
        }
        self.extension_values(&entity, &mut row, &mut changes)?;

        if !row.is_empty() {
            let mut update = Query::update();
            update
                .table(Alias::new(self.name()))
                .values(column_exprs(&row))
                .and_where(sql::key_equals(ID_COLUMN, id))
                .returning_col(Alias::new(ID_COLUMN));
            let updated = sql::query_all(session.tx(), &update).await?;
            match updated.len() {
                0 => return Err(PersistenceError::no_such_entity(entity_type, id)),
                1 => {}
                n => {
                    return Err(PersistenceError::internal(format!(
                        "update of {entity_type} {id} changed {n} rows"
                    )));
                }
            }
        }

        for nav in entity_type.navigation_properties().iter().filter(|n| n.is_set()) {
            if let Some(Link::Many(set)) = entity.link(*nav) {
                self.relation(*nav)?
                    .link_set(session, id, set, LinkMode::Replace)
                    .await?;
                changes.record(*nav);
            }
        }

        for hook in self.hooks().post_update.iter() {
            hook.post_update(session, &entity, id).await?;
        }

        let stored = read::load_by_id(session, self, id)
            .await?
            .ok_or_else(|| PersistenceError::no_such_entity(entity_type, id))?;
        let message = EntityChangedMessage::updated(stored, id.clone(), changes.into_properties());
        session.record_change(message.clone());
        Ok(message)
    }

    /// Delete the entity `id`; rows depending on it go with it.
    pub async fn delete_from_database(&self, session: &Session<'_>, id: &Id) -> PersistenceResult<()> {
        let entity_type = self.entity_type()?;
        for hook in self.hooks().pre_delete.iter() {
            hook.pre_delete(session, id).await?;
        }

        let mut delete = Query::delete();
        delete
            .from_table(Alias::new(self.name()))
            .and_where(sql::key_equals(ID_COLUMN, id));
        let result = sql::exec(session.tx(), &delete).await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::no_such_entity(entity_type, id));
        }

        for hook in self.hooks().post_delete.iter() {
            hook.post_delete(session, id).await?;
        }
        session.record_change(EntityChangedMessage::deleted(entity_type, id.clone()));
        Ok(())
    }
}
