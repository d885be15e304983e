//! Role checks on writes
//!
//! Installed as a table modifier when authorization is enabled. The checks run before
//! every other hook of the same kind.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AuthorizationSettings;
use crate::contract::{Entity, EntityType, Id, PersistenceError, PersistenceResult};
use crate::infra::storage::fields::ColumnValues;
use crate::infra::storage::hooks::{HookPreDelete, HookPreInsert, HookPreUpdate, InsertPhase};
use crate::infra::storage::{TableModifier, TableRegistry};

use super::service::Session;

/// Priority of the role checks
pub const AUTHORIZATION_PRIORITY: f64 = -1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Registers the role checks for every entity table
pub struct AuthorizationHooks {
    settings: AuthorizationSettings,
}

impl AuthorizationHooks {
    pub fn new(settings: AuthorizationSettings) -> Self {
        Self { settings }
    }

    /// Role required to perform `operation` on `entity_type`
    fn required_role(&self, entity_type: EntityType, operation: Operation) -> String {
        let overridden = self.settings.overrides.get(entity_type.name()).and_then(|o| match operation {
            Operation::Create => o.create.clone(),
            Operation::Update => o.update.clone(),
            Operation::Delete => o.delete.clone(),
        });
        overridden.unwrap_or_else(|| match operation {
            Operation::Create => self.settings.role_create.clone(),
            Operation::Update => self.settings.role_update.clone(),
            Operation::Delete => self.settings.role_delete.clone(),
        })
    }
}

impl TableModifier for AuthorizationHooks {
    fn name(&self) -> &str {
        "authorization"
    }

    fn modify_tables(&self, tables: &mut TableRegistry) -> PersistenceResult<()> {
        for entity_type in EntityType::ALL {
            let check = |operation| {
                Arc::new(RoleCheck {
                    entity_type,
                    operation,
                    role: self.required_role(entity_type, operation),
                })
            };
            let hooks = tables.main_mut(entity_type).hooks_mut();
            hooks.register_pre_insert(AUTHORIZATION_PRIORITY, check(Operation::Create));
            hooks.register_pre_update(AUTHORIZATION_PRIORITY, check(Operation::Update));
            hooks.register_pre_delete(AUTHORIZATION_PRIORITY, check(Operation::Delete));
        }
        Ok(())
    }
}

struct RoleCheck {
    entity_type: EntityType,
    operation: Operation,
    role: String,
}

impl RoleCheck {
    fn check(&self, session: &Session<'_>) -> PersistenceResult<()> {
        let allowed = session.principal().is_some_and(|p| p.has_role(&self.role));
        if allowed {
            return Ok(());
        }
        let who = session.principal().map_or("anonymous", |p| p.name.as_str());
        tracing::debug!(
            principal = who,
            entity_type = %self.entity_type,
            role = %self.role,
            "write refused"
        );
        Err(PersistenceError::Forbidden(format!(
            "{who} may not {} {} entities",
            self.operation.verb(),
            self.entity_type
        )))
    }
}

#[async_trait]
impl HookPreInsert for RoleCheck {
    async fn pre_insert(
        &self,
        session: &Session<'_>,
        phase: InsertPhase,
        _entity: &mut Entity,
        _row: &mut ColumnValues,
    ) -> PersistenceResult<bool> {
        if phase == InsertPhase::PreRelations {
            self.check(session)?;
        }
        Ok(true)
    }
}

#[async_trait]
impl HookPreUpdate for RoleCheck {
    async fn pre_update(&self, session: &Session<'_>, _entity: &mut Entity, _id: &Id) -> PersistenceResult<()> {
        self.check(session)
    }
}

#[async_trait]
impl HookPreDelete for RoleCheck {
    async fn pre_delete(&self, session: &Session<'_>, _id: &Id) -> PersistenceResult<()> {
        self.check(session)
    }
}
