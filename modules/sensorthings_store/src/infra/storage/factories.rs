//! Existence checks, create-on-link and feature-of-interest generation

use futures::future::BoxFuture;
use sea_orm::sea_query::{Alias, Expr, JoinType, Order, Query};

use crate::config::IdGenerationMode;
use crate::contract::{
    Entity, EntityProperty, EntityType, Id, PersistenceError, PersistenceResult, PropertyValue,
};
use crate::domain::service::Session;

use super::sql::{self, ID_COLUMN};
use super::table::{TableKind, TableRef};
use super::tables::col;

/// Encoding types whose location document can serve as a feature
const GEOJSON_ENCODINGS: [&str; 2] = ["application/geo+json", "application/vnd.geo+json"];

/// Entity helpers bound to one session
#[derive(Clone, Copy)]
pub struct EntityFactories<'s, 'a> {
    session: &'s Session<'a>,
}

impl<'s, 'a> EntityFactories<'s, 'a> {
    pub fn new(session: &'s Session<'a>) -> Self {
        Self { session }
    }

    /// Whether a row with `id` exists in the table of `entity_type`.
    pub async fn exists(&self, entity_type: EntityType, id: &Id) -> PersistenceResult<bool> {
        let table = TableKind::Main(entity_type);
        let mut select = Query::select();
        select
            .expr(Expr::val(1))
            .from(Alias::new(table.name()))
            .and_where(sql::key_equals(ID_COLUMN, id))
            .limit(1);
        Ok(sql::query_one(self.session.tx(), &select).await?.is_some())
    }

    /// Whether `entity` has an id that exists.
    pub async fn entity_exists(&self, entity: &Entity) -> PersistenceResult<bool> {
        match entity.id() {
            Some(id) => self.exists(entity.entity_type(), id).await,
            None => Ok(false),
        }
    }

    /// Id of `entity`, creating it when it does not exist yet.
    ///
    /// An entity that only carries an id must exist. An entity with an unknown
    /// client id is only created when client ids are accepted.
    pub fn entity_exists_or_create(&self, entity: Entity) -> BoxFuture<'s, PersistenceResult<Id>> {
        let session = self.session;
        Box::pin(async move {
            let factories = EntityFactories::new(session);
            let entity_type = entity.entity_type();
            if let Some(id) = entity.id() {
                if factories.exists(entity_type, id).await? {
                    return Ok(id.clone());
                }
                let server_only = session.settings().id_generation_mode == IdGenerationMode::ServerGeneratedOnly;
                if entity.is_reference() || server_only {
                    return Err(PersistenceError::no_such_entity(entity_type, id));
                }
            }
            let table = session.tables().main(entity_type);
            let created = table
                .insert_into_database(session, entity, &[EntityProperty::Id])
                .await?
                .ok_or_else(|| {
                    PersistenceError::incomplete(format!("creation of linked {entity_type} was refused"))
                })?;
            created
                .id()
                .cloned()
                .ok_or_else(|| PersistenceError::internal(format!("created {entity_type} has no id")))
        })
    }

    /// Convert an `@iot.id` JSON value to an [`Id`] of the configured type.
    pub fn id_from_object(&self, value: &serde_json::Value) -> PersistenceResult<Id> {
        let raw = value.get("@iot.id").unwrap_or(value);
        self.session.id_type().from_json(raw)
    }

    /// Find or create the feature of interest for a new observation of a
    /// (multi)datastream, from the locations of its thing.
    ///
    /// A location that already generated a feature reuses it. Otherwise the first
    /// GeoJSON location becomes a new feature, remembered on the location.
    pub async fn generate_feature_of_interest(&self, stream_id: &Id, multi: bool) -> PersistenceResult<Option<Id>> {
        let session = self.session;
        let id_type = session.id_type();
        let stream_kind = if multi {
            TableKind::Main(EntityType::MultiDatastream)
        } else {
            TableKind::Main(EntityType::Datastream)
        };
        let location = TableRef::new(TableKind::Main(EntityType::Location), "l");
        let link = TableRef::new(TableKind::ThingsLocations, "tl");
        let stream = TableRef::new(stream_kind, "s");

        let mut select = Query::select();
        select
            .column(location.column(ID_COLUMN))
            .column(location.column(col::GEN_FOI_ID))
            .column(location.column(col::NAME))
            .column(location.column(col::DESCRIPTION))
            .column(location.column(col::ENCODING_TYPE))
            .column(location.column(col::LOCATION))
            .from_as(location.table_name(), location.alias_iden())
            .join_as(
                JoinType::InnerJoin,
                link.table_name(),
                link.alias_iden(),
                Expr::col(link.column(col::LOCATION_ID)).equals(location.column(ID_COLUMN)),
            )
            .join_as(
                JoinType::InnerJoin,
                stream.table_name(),
                stream.alias_iden(),
                Expr::col(stream.column(col::THING_ID)).equals(link.column(col::THING_ID)),
            )
            .and_where(Expr::col(stream.column(ID_COLUMN)).eq(sql::id_value(stream_id)))
            .order_by(location.column(ID_COLUMN), Order::Asc);
        let rows = sql::query_all(session.tx(), &select).await?;

        for row in &rows {
            if let Some(existing) = sql::read_id(row, col::GEN_FOI_ID, id_type)? {
                return Ok(Some(existing));
            }
        }
        for row in &rows {
            let encoding: Option<String> = row.try_get("", col::ENCODING_TYPE)?;
            let Some(encoding) = encoding.filter(|e| GEOJSON_ENCODINGS.contains(&e.as_str())) else {
                continue;
            };
            let Some(document) = row.try_get::<Option<String>>("", col::LOCATION)? else {
                continue;
            };
            let feature: serde_json::Value = serde_json::from_str(&document)
                .map_err(|e| PersistenceError::internal(format!("location holds invalid JSON: {e}")))?;
            let location_id = sql::require_id(row, ID_COLUMN, id_type)?;
            let name: Option<String> = row.try_get("", col::NAME)?;
            let description: Option<String> = row.try_get("", col::DESCRIPTION)?;

            let foi = Entity::new(EntityType::FeatureOfInterest)
                .with(EntityProperty::Name, name.unwrap_or_default())
                .with(EntityProperty::Description, description.unwrap_or_default())
                .with(EntityProperty::EncodingType, encoding)
                .with(EntityProperty::Feature, PropertyValue::Json(feature));
            let foi_id = self.entity_exists_or_create(foi).await?;

            let mut update = Query::update();
            update
                .table(Alias::new(TableKind::Main(EntityType::Location).name()))
                .value(Alias::new(col::GEN_FOI_ID), sql::id_value(&foi_id))
                .and_where(sql::key_equals(ID_COLUMN, &location_id));
            sql::exec(session.tx(), &update).await?;
            tracing::debug!(location = %location_id, feature = %foi_id, "generated feature of interest");
            return Ok(Some(foi_id));
        }
        Ok(None)
    }
}
