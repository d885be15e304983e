//! One-time initialisation of the table registry

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::contract::{IdType, PersistenceError, PersistenceResult};
use crate::domain::rules;

use super::registry::TableRegistry;
use super::tables;

/// Plugin that adjusts table definitions before first use
///
/// Modifiers run once, after the built-in definitions and business rules, in
/// registration order. Typical uses are extra hooks, extension columns and security
/// wrappers.
pub trait TableModifier: Send + Sync {
    fn name(&self) -> &str;

    fn modify_tables(&self, tables: &mut TableRegistry) -> PersistenceResult<()>;
}

/// Lazily initialised table registry shared by all sessions
pub struct TableCollection {
    id_type: IdType,
    modifiers: Mutex<Vec<Arc<dyn TableModifier>>>,
    registry: OnceCell<TableRegistry>,
}

impl TableCollection {
    pub fn new(id_type: IdType) -> Self {
        Self {
            id_type,
            modifiers: Mutex::new(Vec::new()),
            registry: OnceCell::new(),
        }
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    /// Register a modifier. Only possible before initialisation.
    pub fn register_modifier(&self, modifier: Arc<dyn TableModifier>) -> PersistenceResult<()> {
        if self.registry.get().is_some() {
            return Err(PersistenceError::Configuration(format!(
                "table modifier {} registered after initialisation",
                modifier.name()
            )));
        }
        self.modifiers.lock().push(modifier);
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.registry.get().is_some()
    }

    /// The registry, building it on first call. Concurrent callers wait for the
    /// first one; a failed build is retried by the next caller.
    pub fn init(&self) -> PersistenceResult<&TableRegistry> {
        self.registry.get_or_try_init(|| {
            let mut registry = TableRegistry::new(self.id_type);
            tables::define_all(&mut registry);
            rules::install(&mut registry);

            let modifiers: Vec<_> = self.modifiers.lock().clone();
            for modifier in &modifiers {
                tracing::debug!(modifier = modifier.name(), "applying table modifier");
                modifier.modify_tables(&mut registry)?;
            }
            registry.validate()?;
            tracing::info!(
                id_type = ?self.id_type,
                modifiers = modifiers.len(),
                "table collection initialised"
            );
            Ok(registry)
        })
    }
}
