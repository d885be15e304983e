//! Domain service - persistence manager and request sessions

use std::sync::Arc;

use parking_lot::Mutex;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, TransactionTrait};

use crate::config::PersistenceSettings;
use crate::contract::{
    Entity, EntityProperty, EntitySet, EntityType, Expression, Id, IdType, PersistenceError,
    PersistenceResult, Principal, Query, QueryTarget,
};
use crate::infra::storage::collection::{TableCollection, TableModifier};
use crate::infra::storage::factories::EntityFactories;
use crate::infra::storage::migrations;
use crate::infra::storage::read;
use crate::infra::storage::registry::TableRegistry;

use super::authorization::AuthorizationHooks;
use super::events::{EntityChangedMessage, EventPublisher, NoOpEventPublisher};

/// Entry point of the persistence core
///
/// Owns the connection pool, the settings and the shared table collection. All
/// entity operations go through a [`Session`] bound to a caller-owned transaction.
pub struct PersistenceManager {
    db: DatabaseConnection,
    settings: PersistenceSettings,
    tables: Arc<TableCollection>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl PersistenceManager {
    /// Create a manager. Authorization hooks are registered when enabled in `settings`.
    pub fn new(db: DatabaseConnection, settings: PersistenceSettings) -> PersistenceResult<Self> {
        let tables = Arc::new(TableCollection::new(settings.id_type));
        if settings.authorization.enabled {
            tables.register_modifier(Arc::new(AuthorizationHooks::new(settings.authorization.clone())))?;
        }
        Ok(Self {
            db,
            settings,
            tables,
            event_publisher: Arc::new(NoOpEventPublisher),
        })
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = publisher;
        self
    }

    pub fn settings(&self) -> &PersistenceSettings {
        &self.settings
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn tables(&self) -> &TableCollection {
        &self.tables
    }

    /// Register a table modifier; must happen before the first session.
    pub fn register_modifier(&self, modifier: Arc<dyn TableModifier>) -> PersistenceResult<()> {
        self.tables.register_modifier(modifier)
    }

    /// Create the schema for the configured id type.
    pub async fn install_schema(&self) -> PersistenceResult<()> {
        migrations::install_schema(&self.db, self.settings.id_type).await?;
        Ok(())
    }

    pub async fn begin(&self) -> PersistenceResult<DatabaseTransaction> {
        Ok(self.db.begin().await?)
    }

    /// Open a session on `tx`, initialising the tables on first use.
    pub fn session<'a>(&'a self, tx: &'a DatabaseTransaction, principal: Option<Principal>) -> PersistenceResult<Session<'a>> {
        let tables = self.tables.init()?;
        Ok(Session {
            tx,
            tables,
            settings: &self.settings,
            principal,
            changes: Mutex::new(Vec::new()),
        })
    }

    /// Hand committed change messages to the event publisher, in order.
    pub async fn publish_changes(&self, messages: Vec<EntityChangedMessage>) -> PersistenceResult<()> {
        for message in messages {
            self.event_publisher.publish(message).await?;
        }
        Ok(())
    }
}

/// Request-scoped view of the persistence core
///
/// Every statement of a session runs on the transaction it was opened with;
/// committing or rolling back is up to the caller.
pub struct Session<'a> {
    tx: &'a DatabaseTransaction,
    tables: &'a TableRegistry,
    settings: &'a PersistenceSettings,
    principal: Option<Principal>,
    changes: Mutex<Vec<EntityChangedMessage>>,
}

impl<'a> Session<'a> {
    pub fn tx(&self) -> &'a DatabaseTransaction {
        self.tx
    }

    pub fn backend(&self) -> DbBackend {
        self.tx.get_database_backend()
    }

    pub fn tables(&self) -> &'a TableRegistry {
        self.tables
    }

    pub fn settings(&self) -> &'a PersistenceSettings {
        self.settings
    }

    pub fn id_type(&self) -> IdType {
        self.tables.id_type()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn factories(&self) -> EntityFactories<'_, 'a> {
        EntityFactories::new(self)
    }

    pub(crate) fn record_change(&self, message: EntityChangedMessage) {
        tracing::debug!(kind = ?message.kind, entity_type = %message.entity_type, id = %message.id, "entity changed");
        self.changes.lock().push(message);
    }

    /// Drain the change messages recorded so far.
    pub fn take_changes(&self) -> Vec<EntityChangedMessage> {
        std::mem::take(&mut *self.changes.lock())
    }

    // ===== Reads =====

    /// One entity by id; `None` when it does not exist or is not visible.
    pub async fn get(&self, entity_type: EntityType, id: &Id, query: &Query) -> PersistenceResult<Option<Entity>> {
        read::get_entity(self, entity_type, id, query).await
    }

    pub async fn query(&self, target: &QueryTarget, query: &Query) -> PersistenceResult<EntitySet> {
        read::query_entities(self, target, query).await
    }

    /// Number of entities matching `query`, ignoring paging.
    pub async fn count(&self, target: &QueryTarget, query: &Query) -> PersistenceResult<u64> {
        read::count_entities(self, target, query).await
    }

    // ===== Writes =====

    /// Create an entity (and any new linked entities). `None` when a hook vetoed it.
    pub async fn insert(&self, entity: Entity) -> PersistenceResult<Option<Entity>> {
        self.insert_selecting(entity, &[]).await
    }

    /// Like [`Session::insert`], returning only the `select`ed properties.
    pub async fn insert_selecting(&self, entity: Entity, select: &[EntityProperty]) -> PersistenceResult<Option<Entity>> {
        let table = self.tables.main(entity.entity_type());
        table.insert_into_database(self, entity, select).await
    }

    /// Apply the properties set on `entity` to the entity `id`.
    pub async fn update(&self, entity: Entity, id: &Id) -> PersistenceResult<EntityChangedMessage> {
        let table = self.tables.main(entity.entity_type());
        table.update_in_database(self, entity, id).await
    }

    pub async fn delete(&self, entity_type: EntityType, id: &Id) -> PersistenceResult<()> {
        self.tables.main(entity_type).delete_from_database(self, id).await
    }

    /// Delete every entity of `target` matching `filter`; returns how many were deleted.
    pub async fn delete_where(&self, target: &QueryTarget, filter: &Expression) -> PersistenceResult<u64> {
        let ids = read::matching_ids(self, target, filter).await?;
        let table = self.tables.main(target.entity_type);
        let mut deleted = 0;
        for id in ids {
            match table.delete_from_database(self, &id).await {
                Ok(()) => deleted += 1,
                // cascades from an earlier delete may already have removed it
                Err(PersistenceError::NoSuchEntity { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}
