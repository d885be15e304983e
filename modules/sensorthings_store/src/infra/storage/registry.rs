use crate::contract::{EntityType, IdType, PersistenceResult};

use super::table::{TableDescriptor, TableKind};

/// All table descriptors, indexed by [`TableKind`]
pub struct TableRegistry {
    id_type: IdType,
    tables: Vec<TableDescriptor>,
}

impl TableRegistry {
    /// Empty descriptors for every table
    pub(crate) fn new(id_type: IdType) -> Self {
        Self {
            id_type,
            tables: TableKind::all().map(TableDescriptor::new).collect(),
        }
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    pub fn table(&self, kind: TableKind) -> &TableDescriptor {
        &self.tables[kind.index()]
    }

    pub fn table_mut(&mut self, kind: TableKind) -> &mut TableDescriptor {
        &mut self.tables[kind.index()]
    }

    /// Main table of an entity type
    pub fn main(&self, entity_type: EntityType) -> &TableDescriptor {
        self.table(TableKind::Main(entity_type))
    }

    pub fn main_mut(&mut self, entity_type: EntityType) -> &mut TableDescriptor {
        self.table_mut(TableKind::Main(entity_type))
    }

    /// Look a table up by its physical name
    pub fn by_name(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    pub(crate) fn validate(&self) -> PersistenceResult<()> {
        self.tables.iter().try_for_each(TableDescriptor::validate)
    }
}
