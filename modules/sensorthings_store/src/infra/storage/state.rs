use std::collections::HashMap;

use sea_orm::sea_query::{Order, Query, SelectStatement, SimpleExpr};
use sea_orm::DbBackend;

use crate::contract::{NavProperty, Principal};

use super::registry::TableRegistry;
use super::table::{TableKind, TableRef};

/// Mutable state of one SELECT being built
///
/// Aliases are unique across the statement, including correlated sub-queries, so a
/// table joined twice never collides with itself.
pub struct QueryState<'t> {
    pub(crate) tables: &'t TableRegistry,
    pub(crate) backend: DbBackend,
    pub(crate) main: TableRef,
    pub(crate) select: SelectStatement,
    next_alias: usize,
    joins: HashMap<(String, NavProperty), TableRef>,
    /// Sort keys contributed by the parent restriction (link-table rank)
    pub(crate) rank_order: Vec<(SimpleExpr, Order)>,
    /// Whether security wrappers apply, and for whom
    secured: bool,
    principal: Option<Principal>,
}

impl<'t> QueryState<'t> {
    pub fn new(tables: &'t TableRegistry, backend: DbBackend, kind: TableKind) -> Self {
        let main = TableRef::new(kind, "e0");
        let mut select = Query::select();
        select.from_as(main.table_name(), main.alias_iden());
        Self {
            tables,
            backend,
            main,
            select,
            next_alias: 1,
            joins: HashMap::new(),
            rank_order: Vec::new(),
            secured: false,
            principal: None,
        }
    }

    /// Apply the security wrapper of every table the statement touches for `principal`.
    pub fn secured(mut self, principal: Option<&Principal>) -> Self {
        self.secured = true;
        self.principal = principal.cloned();
        self
    }

    /// Row restriction the security wrapper of `table` imposes, if any.
    pub(crate) fn security_condition(&self, table: &TableRef) -> Option<SimpleExpr> {
        if !self.secured {
            return None;
        }
        let TableKind::Main(entity_type) = table.kind() else {
            return None;
        };
        self.tables
            .main(entity_type)
            .security_wrapper()?
            .restrict(table, self.principal.as_ref())
    }

    /// A fresh alias for `kind`
    pub fn alias_for(&mut self, kind: TableKind) -> TableRef {
        let alias = format!("e{}", self.next_alias);
        self.next_alias += 1;
        TableRef::new(kind, alias)
    }

    pub(crate) fn cached_join(&self, source: &TableRef, nav: NavProperty) -> Option<TableRef> {
        self.joins.get(&(source.alias().to_string(), nav)).cloned()
    }

    pub(crate) fn remember_join(&mut self, source: &TableRef, nav: NavProperty, target: TableRef) {
        self.joins.insert((source.alias().to_string(), nav), target);
    }
}
