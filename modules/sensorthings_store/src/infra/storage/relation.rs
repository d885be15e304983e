//! Relations between tables
//!
//! A relation answers three questions for its navigation property: how to join the
//! target (ordering by to-one paths), how to test for related rows (filters, which
//! never join to-many relations but use correlated EXISTS), and how to write links.

use sea_orm::sea_query::{Alias, Expr, Func, JoinType, Order, Query, SelectStatement, SimpleExpr};
use sea_orm::Value;

use crate::contract::{
    Entity, EntitySet, EntityType, Id, Link, NavProperty, PersistenceError, PersistenceResult,
};
use crate::domain::service::Session;

use super::history;
use super::sql::{self, ID_COLUMN};
use super::state::QueryState;
use super::table::{TableKind, TableRef};

/// How set-valued links are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Insert: add links, keep existing ones
    Additive,
    /// Update: the given set becomes the complete set
    Replace,
}

/// Which side of a ranked link table the rank counts along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankSide {
    /// Rank is the position in the source's list
    Source,
    /// Rank appends to the target's list
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankColumn {
    pub column: &'static str,
    pub side: RankSide,
}

/// Which end of Thing ↔ Location a many-to-many relation is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySide {
    Thing,
    Location,
}

/// Relation through a foreign key, in either direction
///
/// `Datastream.Thing` has the key on the source (`DATASTREAMS.THING_ID` → `THINGS.ID`);
/// `Thing.Datastreams` has it on the target (`THINGS.ID` → `DATASTREAMS.THING_ID`).
#[derive(Debug, Clone)]
pub struct OneToMany {
    pub name: NavProperty,
    pub source: EntityType,
    pub source_field: &'static str,
    pub target: EntityType,
    pub target_field: &'static str,
    pub target_is_many: bool,
}

impl OneToMany {
    /// To-one relation through a foreign key held by the source
    pub fn to_one(name: NavProperty, source: EntityType, foreign_key: &'static str, target: EntityType) -> Self {
        Self {
            name,
            source,
            source_field: foreign_key,
            target,
            target_field: ID_COLUMN,
            target_is_many: false,
        }
    }

    /// To-many relation through a foreign key held by the target
    pub fn to_many(name: NavProperty, source: EntityType, target: EntityType, foreign_key: &'static str) -> Self {
        Self {
            name,
            source,
            source_field: ID_COLUMN,
            target,
            target_field: foreign_key,
            target_is_many: true,
        }
    }

    fn condition(&self, source: &TableRef, target: &TableRef) -> SimpleExpr {
        Expr::col(target.column(self.target_field)).equals(source.column(self.source_field))
    }
}

/// Relation through a link table
#[derive(Debug, Clone)]
pub struct ManyToMany {
    pub name: NavProperty,
    pub source: EntityType,
    pub link: TableKind,
    pub source_link_field: &'static str,
    pub target_link_field: &'static str,
    pub target: EntityType,
    pub rank: Option<RankColumn>,
    pub history: Option<HistorySide>,
}

impl ManyToMany {
    pub fn new(
        name: NavProperty,
        source: EntityType,
        link: TableKind,
        source_link_field: &'static str,
        target_link_field: &'static str,
        target: EntityType,
    ) -> Self {
        Self {
            name,
            source,
            link,
            source_link_field,
            target_link_field,
            target,
            rank: None,
            history: None,
        }
    }

    pub fn with_rank(mut self, column: &'static str, side: RankSide) -> Self {
        self.rank = Some(RankColumn { column, side });
        self
    }

    pub fn with_history(mut self, side: HistorySide) -> Self {
        self.history = Some(side);
        self
    }

    fn link_name(&self) -> Alias {
        Alias::new(self.link.name())
    }

    /// Delete every link of `source_id`.
    pub(crate) async fn unlink_all(&self, session: &Session<'_>, source_id: &Id) -> PersistenceResult<u64> {
        let mut delete = Query::delete();
        delete
            .from_table(self.link_name())
            .and_where(sql::key_equals(self.source_link_field, source_id));
        Ok(sql::exec(session.tx(), &delete).await?.rows_affected())
    }

    /// Ids linked to `source_id`, in link order.
    pub(crate) async fn linked_ids(&self, session: &Session<'_>, source_id: &Id) -> PersistenceResult<Vec<Id>> {
        let mut select = Query::select();
        select
            .column(Alias::new(self.target_link_field))
            .from(self.link_name())
            .and_where(sql::key_equals(self.source_link_field, source_id));
        match self.rank {
            Some(rank) => select.order_by(Alias::new(rank.column), Order::Asc),
            None => select.order_by(Alias::new(self.target_link_field), Order::Asc),
        };
        let id_type = session.id_type();
        sql::query_all(session.tx(), &select)
            .await?
            .iter()
            .map(|row| sql::require_id(row, self.target_link_field, id_type))
            .collect()
    }

    pub(crate) async fn is_linked(&self, session: &Session<'_>, source_id: &Id, target_id: &Id) -> PersistenceResult<bool> {
        let mut select = Query::select();
        select
            .expr(Expr::val(1))
            .from(self.link_name())
            .and_where(sql::key_equals(self.source_link_field, source_id))
            .and_where(sql::key_equals(self.target_link_field, target_id))
            .limit(1);
        Ok(sql::query_one(session.tx(), &select).await?.is_some())
    }

    async fn next_rank(&self, session: &Session<'_>, rank: RankColumn, source_id: &Id, target_id: &Id) -> PersistenceResult<i64> {
        let (field, id) = match rank.side {
            RankSide::Source => (self.source_link_field, source_id),
            RankSide::Target => (self.target_link_field, target_id),
        };
        let mut select = Query::select();
        select
            .expr_as(Func::count(Expr::col(Alias::new(field))), Alias::new("N"))
            .from(self.link_name())
            .and_where(sql::key_equals(field, id));
        let row = sql::query_one(session.tx(), &select).await?;
        Ok(match row {
            Some(row) => row.try_get::<i64>("", "N")?,
            None => 0,
        })
    }

    /// Insert one link row.
    pub(crate) async fn insert_link(&self, session: &Session<'_>, source_id: &Id, target_id: &Id) -> PersistenceResult<()> {
        let mut columns = vec![Alias::new(self.source_link_field), Alias::new(self.target_link_field)];
        let mut values: Vec<SimpleExpr> = vec![sql::id_value(source_id).into(), sql::id_value(target_id).into()];
        if let Some(rank) = self.rank {
            let next = self.next_rank(session, rank, source_id, target_id).await?;
            columns.push(Alias::new(rank.column));
            values.push(Value::from(next).into());
        }
        let mut insert = Query::insert();
        insert
            .into_table(self.link_name())
            .columns(columns)
            .values(values)
            .map_err(|e| PersistenceError::internal(format!("link insert: {e}")))?;
        sql::exec(session.tx(), &insert).await?;
        Ok(())
    }

    async fn link(&self, session: &Session<'_>, source_id: &Id, set: &EntitySet, mode: LinkMode) -> PersistenceResult<()> {
        match self.history {
            Some(HistorySide::Thing) => return history::link_locations_to_thing(session, self, source_id, set, mode).await,
            Some(HistorySide::Location) => return history::link_things_to_location(session, self, source_id, set, mode).await,
            None => {}
        }
        if mode == LinkMode::Replace {
            self.unlink_all(session, source_id).await?;
        }
        let factories = session.factories();
        for child in set {
            let target_id = factories.entity_exists_or_create(child.clone()).await?;
            if mode == LinkMode::Additive && self.is_linked(session, source_id, &target_id).await? {
                continue;
            }
            self.insert_link(session, source_id, &target_id).await?;
        }
        Ok(())
    }
}

/// Correlated sub-query started by [`Relation::semi_join_to`]
pub struct SemiJoin {
    pub target: TableRef,
    select: SelectStatement,
}

impl SemiJoin {
    /// `EXISTS (… AND inner)`
    pub fn exists(mut self, inner: SimpleExpr) -> SimpleExpr {
        self.select.and_where(inner);
        Expr::exists(self.select)
    }
}

#[derive(Debug, Clone)]
pub enum Relation {
    OneToMany(OneToMany),
    ManyToMany(ManyToMany),
}

impl From<OneToMany> for Relation {
    fn from(r: OneToMany) -> Self {
        Self::OneToMany(r)
    }
}

impl From<ManyToMany> for Relation {
    fn from(r: ManyToMany) -> Self {
        Self::ManyToMany(r)
    }
}

impl Relation {
    pub fn name(&self) -> NavProperty {
        match self {
            Self::OneToMany(r) => r.name,
            Self::ManyToMany(r) => r.name,
        }
    }

    pub fn source(&self) -> EntityType {
        match self {
            Self::OneToMany(r) => r.source,
            Self::ManyToMany(r) => r.source,
        }
    }

    pub fn target(&self) -> EntityType {
        match self {
            Self::OneToMany(r) => r.target,
            Self::ManyToMany(r) => r.target,
        }
    }

    pub fn is_to_one(&self) -> bool {
        matches!(self, Self::OneToMany(r) if !r.target_is_many)
    }

    /// Left-join the target of a to-one relation; repeated joins from the same
    /// source alias are reused.
    pub(crate) fn join(&self, state: &mut QueryState<'_>, source: &TableRef) -> PersistenceResult<TableRef> {
        let Self::OneToMany(r) = self else {
            return Err(PersistenceError::invalid(format!("{} is not a to-one navigation", self.name())));
        };
        if r.target_is_many {
            return Err(PersistenceError::invalid(format!("{} is not a to-one navigation", r.name)));
        }
        if let Some(existing) = state.cached_join(source, r.name) {
            return Ok(existing);
        }
        let target = state.alias_for(TableKind::Main(r.target));
        let mut on = r.condition(source, &target);
        if let Some(visible) = state.security_condition(&target) {
            on = on.and(visible);
        }
        state
            .select
            .join_as(JoinType::LeftJoin, target.table_name(), target.alias_iden(), on);
        state.remember_join(source, r.name, target.clone());
        Ok(target)
    }

    /// Start `EXISTS (SELECT 1 FROM target WHERE <correlated with source>)`.
    pub(crate) fn semi_join_to(&self, state: &mut QueryState<'_>, source: &TableRef) -> SemiJoin {
        let mut select = Query::select();
        select.expr(Expr::val(1));
        match self {
            Self::OneToMany(r) => {
                let target = state.alias_for(TableKind::Main(r.target));
                select
                    .from_as(target.table_name(), target.alias_iden())
                    .and_where(r.condition(source, &target));
                if let Some(visible) = state.security_condition(&target) {
                    select.and_where(visible);
                }
                SemiJoin { target, select }
            }
            Self::ManyToMany(r) => {
                let link = state.alias_for(r.link);
                let target = state.alias_for(TableKind::Main(r.target));
                select
                    .from_as(link.table_name(), link.alias_iden())
                    .join_as(
                        JoinType::InnerJoin,
                        target.table_name(),
                        target.alias_iden(),
                        Expr::col(target.column(ID_COLUMN)).equals(link.column(r.target_link_field)),
                    )
                    .and_where(Expr::col(link.column(r.source_link_field)).equals(source.column(ID_COLUMN)));
                if let Some(visible) = state.security_condition(&target) {
                    select.and_where(visible);
                }
                SemiJoin { target, select }
            }
        }
    }

    /// Restrict `target` (the main table of `state`) to rows related to `parent_id`.
    ///
    /// Returns a condition to AND into the query, or `None` when the restriction was
    /// fully expressed as an inner join. A parent the principal can not read has no
    /// related rows.
    pub(crate) fn restrict_to_parent(
        &self,
        state: &mut QueryState<'_>,
        target: &TableRef,
        parent_id: &Id,
    ) -> Option<SimpleExpr> {
        match self {
            Self::OneToMany(r) if r.source_field == ID_COLUMN => {
                let related = Expr::col(target.column(r.target_field)).eq(sql::id_value(parent_id));
                Some(match parent_visible(state, r.source, parent_id) {
                    Some(visible) => related.and(visible),
                    None => related,
                })
            }
            Self::OneToMany(r) => {
                let parent = state.alias_for(TableKind::Main(r.source));
                let mut select = Query::select();
                select
                    .expr(Expr::val(1))
                    .from_as(parent.table_name(), parent.alias_iden())
                    .and_where(Expr::col(parent.column(ID_COLUMN)).eq(sql::id_value(parent_id)))
                    .and_where(r.condition(&parent, target));
                if let Some(visible) = state.security_condition(&parent) {
                    select.and_where(visible);
                }
                Some(Expr::exists(select))
            }
            Self::ManyToMany(r) => {
                let link = state.alias_for(r.link);
                state.select.join_as(
                    JoinType::InnerJoin,
                    link.table_name(),
                    link.alias_iden(),
                    Expr::col(link.column(r.target_link_field))
                        .equals(target.column(ID_COLUMN))
                        .and(Expr::col(link.column(r.source_link_field)).eq(sql::id_value(parent_id))),
                );
                if let Some(rank) = r.rank.filter(|rank| rank.side == RankSide::Source) {
                    state.rank_order.push((link.col(rank.column), Order::Asc));
                }
                parent_visible(state, r.source, parent_id)
            }
        }
    }

    /// Resolve a to-one link into the foreign key column and its bind value.
    ///
    /// With `create_missing` (inserts) a linked entity that does not exist yet is
    /// created; otherwise (updates) it must already exist.
    pub(crate) async fn resolve_to_one(
        &self,
        session: &Session<'_>,
        link: &Link,
        create_missing: bool,
    ) -> PersistenceResult<(&'static str, Value)> {
        let Self::OneToMany(r) = self else {
            return Err(PersistenceError::invalid(format!("{} is not a to-one navigation", self.name())));
        };
        if r.target_is_many {
            return Err(PersistenceError::invalid(format!("{} is not a to-one navigation", r.name)));
        }
        let linked = match link {
            Link::One(None) => return Ok((r.source_field, sql::null_id_value(session.id_type()))),
            Link::One(Some(entity)) => entity.as_ref(),
            Link::Many(_) => {
                return Err(PersistenceError::invalid(format!("{} takes a single entity", r.name)));
            }
        };
        let factories = session.factories();
        let id = if create_missing {
            factories.entity_exists_or_create(linked.clone()).await?
        } else {
            let id = linked
                .id()
                .ok_or_else(|| PersistenceError::incomplete(format!("linked {} needs an id", r.target)))?;
            if !factories.exists(r.target, id).await? {
                return Err(PersistenceError::no_such_entity(r.target, id));
            }
            id.clone()
        };
        Ok((r.source_field, sql::id_value(&id)))
    }

    /// Write the links of a set-valued navigation property of `source_id`.
    pub(crate) async fn link_set(
        &self,
        session: &Session<'_>,
        source_id: &Id,
        set: &EntitySet,
        mode: LinkMode,
    ) -> PersistenceResult<()> {
        match self {
            Self::OneToMany(r) if r.target_is_many => link_children(session, r, source_id, set).await,
            Self::OneToMany(r) => Err(PersistenceError::invalid(format!("{} takes a single entity", r.name))),
            Self::ManyToMany(r) => r.link(session, source_id, set, mode).await,
        }
    }
}

/// `EXISTS` over the parent row, when the parent's table restricts reads.
fn parent_visible(state: &mut QueryState<'_>, parent: EntityType, parent_id: &Id) -> Option<SimpleExpr> {
    let alias = state.alias_for(TableKind::Main(parent));
    let visible = state.security_condition(&alias)?;
    let mut select = Query::select();
    select
        .expr(Expr::val(1))
        .from_as(alias.table_name(), alias.alias_iden())
        .and_where(Expr::col(alias.column(ID_COLUMN)).eq(sql::id_value(parent_id)))
        .and_where(visible);
    Some(Expr::exists(select))
}

/// Point the foreign key of every child at `source_id`, creating new children.
///
/// Children can not be detached (their key is mandatory), so replacing the set
/// only ever adds.
async fn link_children(session: &Session<'_>, r: &OneToMany, source_id: &Id, set: &EntitySet) -> PersistenceResult<()> {
    let factories = session.factories();
    let inverse = r
        .name
        .inverse(r.source)
        .ok_or_else(|| PersistenceError::Configuration(format!("{} has no inverse", r.name)))?;
    for child in set {
        if let Some(child_id) = child.id() {
            if factories.exists(r.target, child_id).await? {
                let mut update = Query::update();
                update
                    .table(Alias::new(TableKind::Main(r.target).name()))
                    .value(Alias::new(r.target_field), sql::id_value(source_id))
                    .and_where(sql::key_equals(ID_COLUMN, child_id));
                sql::exec(session.tx(), &update).await?;
                continue;
            }
        }
        let mut child = child.clone();
        child.set_link(
            inverse,
            Link::One(Some(Box::new(Entity::reference(r.source, source_id.clone())))),
        );
        factories.entity_exists_or_create(child).await?;
    }
    Ok(())
}
