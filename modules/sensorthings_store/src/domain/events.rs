//! Entity change events
//!
//! Every successful create, update and delete leaves one message in the session.
//! The caller drains them after commit and hands them to an [`EventPublisher`];
//! nothing is published for a transaction that rolls back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::{Entity, EntityType, Id, PersistenceResult, Property};

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One entity change
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChangedMessage {
    pub kind: ChangeKind,
    pub entity_type: EntityType,
    pub id: Id,
    /// State after the change; `None` for deletes
    pub entity: Option<Entity>,
    /// Properties touched by an update; empty otherwise
    pub changed: Vec<Property>,
    pub timestamp: DateTime<Utc>,
}

impl EntityChangedMessage {
    pub fn created(entity: Entity, id: Id) -> Self {
        Self {
            kind: ChangeKind::Create,
            entity_type: entity.entity_type(),
            id,
            entity: Some(entity),
            changed: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn updated(entity: Entity, id: Id, changed: Vec<Property>) -> Self {
        Self {
            kind: ChangeKind::Update,
            entity_type: entity.entity_type(),
            id,
            entity: Some(entity),
            changed,
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(entity_type: EntityType, id: Id) -> Self {
        Self {
            kind: ChangeKind::Delete,
            entity_type,
            id,
            entity: None,
            changed: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Serialisable summary of a change, for transports that carry events as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    pub entity_type: String,
    pub id: serde_json::Value,
    pub changed: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&EntityChangedMessage> for ChangeNotice {
    fn from(message: &EntityChangedMessage) -> Self {
        Self {
            kind: message.kind,
            entity_type: message.entity_type.name().to_string(),
            id: message.id.as_json(),
            changed: message.changed.iter().map(ToString::to_string).collect(),
            timestamp: message.timestamp,
        }
    }
}

/// Receives committed change messages
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one committed change
    async fn publish(&self, message: EntityChangedMessage) -> PersistenceResult<()>;
}

/// No-op event publisher for testing or when events are disabled
pub struct NoOpEventPublisher;

#[async_trait::async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, message: EntityChangedMessage) -> PersistenceResult<()> {
        tracing::trace!(kind = ?message.kind, entity_type = %message.entity_type, id = %message.id, "dropping change event");
        Ok(())
    }
}
