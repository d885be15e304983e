//! Table lifecycle hooks
//!
//! Hooks run inside the caller's transaction. Within one kind they run by ascending
//! priority, ties in registration order. Returning `false` from an insert hook vetoes
//! the insert without an error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{Entity, Id, PersistenceResult};
use crate::domain::service::Session;

use super::fields::ColumnValues;

/// Where in the insert protocol a pre-insert hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPhase {
    /// Before to-one relations are resolved
    PreRelations,
    /// After to-one relations were resolved into the insert row
    PostRelations,
}

#[async_trait]
pub trait HookPreInsert: Send + Sync {
    async fn pre_insert(
        &self,
        session: &Session<'_>,
        phase: InsertPhase,
        entity: &mut Entity,
        row: &mut ColumnValues,
    ) -> PersistenceResult<bool>;
}

#[async_trait]
pub trait HookPostInsert: Send + Sync {
    async fn post_insert(&self, session: &Session<'_>, entity: &Entity, row: &ColumnValues) -> PersistenceResult<bool>;
}

#[async_trait]
pub trait HookPreUpdate: Send + Sync {
    async fn pre_update(&self, session: &Session<'_>, entity: &mut Entity, id: &Id) -> PersistenceResult<()>;
}

#[async_trait]
pub trait HookPostUpdate: Send + Sync {
    async fn post_update(&self, session: &Session<'_>, entity: &Entity, id: &Id) -> PersistenceResult<()>;
}

#[async_trait]
pub trait HookPreDelete: Send + Sync {
    async fn pre_delete(&self, session: &Session<'_>, id: &Id) -> PersistenceResult<()>;
}

#[async_trait]
pub trait HookPostDelete: Send + Sync {
    async fn post_delete(&self, session: &Session<'_>, id: &Id) -> PersistenceResult<()>;
}

struct Registered<H: ?Sized> {
    priority: f64,
    sequence: u64,
    hook: Arc<H>,
}

/// Hooks of one kind, kept sorted
pub struct HookList<H: ?Sized> {
    entries: Vec<Registered<H>>,
    next_sequence: u64,
}

impl<H: ?Sized> Default for HookList<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_sequence: 0,
        }
    }
}

impl<H: ?Sized> Clone for HookList<H> {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| Registered {
                    priority: e.priority,
                    sequence: e.sequence,
                    hook: Arc::clone(&e.hook),
                })
                .collect(),
            next_sequence: self.next_sequence,
        }
    }
}

impl<H: ?Sized> HookList<H> {
    pub fn register(&mut self, priority: f64, hook: Arc<H>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(Registered {
            priority,
            sequence,
            hook,
        });
        self.entries
            .sort_by(|a, b| a.priority.total_cmp(&b.priority).then(a.sequence.cmp(&b.sequence)));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<H>> {
        self.entries.iter().map(|e| &e.hook)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All hooks of one table
#[derive(Default, Clone)]
pub struct HookRegistry {
    pub pre_insert: HookList<dyn HookPreInsert>,
    pub post_insert: HookList<dyn HookPostInsert>,
    pub pre_update: HookList<dyn HookPreUpdate>,
    pub post_update: HookList<dyn HookPostUpdate>,
    pub pre_delete: HookList<dyn HookPreDelete>,
    pub post_delete: HookList<dyn HookPostDelete>,
}

impl HookRegistry {
    pub fn register_pre_insert(&mut self, priority: f64, hook: Arc<dyn HookPreInsert>) {
        self.pre_insert.register(priority, hook);
    }

    pub fn register_post_insert(&mut self, priority: f64, hook: Arc<dyn HookPostInsert>) {
        self.post_insert.register(priority, hook);
    }

    pub fn register_pre_update(&mut self, priority: f64, hook: Arc<dyn HookPreUpdate>) {
        self.pre_update.register(priority, hook);
    }

    pub fn register_post_update(&mut self, priority: f64, hook: Arc<dyn HookPostUpdate>) {
        self.post_update.register(priority, hook);
    }

    pub fn register_pre_delete(&mut self, priority: f64, hook: Arc<dyn HookPreDelete>) {
        self.pre_delete.register(priority, hook);
    }

    pub fn register_post_delete(&mut self, priority: f64, hook: Arc<dyn HookPostDelete>) {
        self.post_delete.register(priority, hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct N(&'static str);

    impl Named for N {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn lower_priority_runs_first_and_ties_keep_registration_order() {
        let mut list: HookList<dyn Named> = HookList::default();
        list.register(10.0, Arc::new(N("late")));
        list.register(-1.0, Arc::new(N("early")));
        list.register(10.0, Arc::new(N("late-second")));
        list.register(0.0, Arc::new(N("middle")));

        let order: Vec<_> = list.iter().map(|h| h.name()).collect();
        assert_eq!(order, ["early", "middle", "late", "late-second"]);
    }
}
