//! Reads: projection, restriction, paging and expansion

use futures::future::BoxFuture;
use sea_orm::sea_query::{Alias, Expr, Func, Order};
use sea_orm::QueryResult;

use crate::contract::{
    Direction, Entity, EntityProperty, EntitySet, EntityType, Expand, Expression, Id, IdType,
    Link, PersistenceError, PersistenceResult, Query, QueryTarget,
};
use crate::domain::service::Session;

use super::expression::{compile_filter, order_expressions};
use super::fields::DataSize;
use super::sql::{self, ID_COLUMN};
use super::state::QueryState;
use super::table::{TableDescriptor, TableKind};

/// Properties a read materialises
struct Projection {
    properties: Vec<EntityProperty>,
    /// Extension columns are only part of the default projection
    extras: bool,
}

impl Projection {
    fn new(table: &TableDescriptor, select: &[EntityProperty], hidden: &[EntityProperty]) -> Self {
        Self {
            properties: table
                .fields()
                .selected_entries(select)
                .map(|entry| entry.property)
                .filter(|property| !hidden.contains(property))
                .collect(),
            extras: select.is_empty(),
        }
    }

    fn apply(&self, table: &TableDescriptor, state: &mut QueryState<'_>) -> PersistenceResult<()> {
        let main = state.main.clone();
        state.select.column(main.column(ID_COLUMN));
        for property in &self.properties {
            for field in table.fields().fields_for_property(*property)?.select_fields() {
                state.select.column(main.column(field.column));
            }
        }
        for foreign_key in table.foreign_keys() {
            state.select.column(main.column(foreign_key.source_field));
        }
        if self.extras {
            for column in table.extra_columns() {
                state.select.column(main.column(&column.name));
            }
        }
        Ok(())
    }

    fn read(
        &self,
        table: &TableDescriptor,
        row: &QueryResult,
        id_type: IdType,
        size: &mut DataSize,
    ) -> PersistenceResult<Entity> {
        let entity_type = table.entity_type()?;
        let mut entity = Entity::new(entity_type);
        entity.set_id(sql::require_id(row, ID_COLUMN, id_type)?);
        for property in &self.properties {
            table
                .fields()
                .fields_for_property(*property)?
                .converter
                .read(row, &mut entity, size)?;
        }
        for foreign_key in table.foreign_keys() {
            if let Some(id) = sql::read_id(row, foreign_key.source_field, id_type)? {
                entity.set_link(
                    foreign_key.name,
                    Link::One(Some(Box::new(Entity::reference(foreign_key.target, id)))),
                );
            }
        }
        if self.extras {
            for column in table.extra_columns() {
                entity.set_extension(column.name.clone(), column.read(row)?);
            }
        }
        Ok(entity)
    }
}

/// Build an entity from a full row (as returned by `INSERT … RETURNING *`).
pub(crate) fn materialize(
    table: &TableDescriptor,
    row: &QueryResult,
    select: &[EntityProperty],
    id_type: IdType,
    size: &mut DataSize,
) -> PersistenceResult<Entity> {
    Projection::new(table, select, &[]).read(table, row, id_type, size)
}

fn hidden_properties(table: &TableDescriptor, session: &Session<'_>) -> Vec<EntityProperty> {
    table
        .security_wrapper()
        .map(|wrapper| wrapper.hidden_properties(session.principal()))
        .unwrap_or_default()
}

/// Restricted SELECT on the target table, without projection or ordering.
fn restricted<'t>(
    session: &Session<'t>,
    target: &QueryTarget,
    filter: Option<&Expression>,
) -> PersistenceResult<QueryState<'t>> {
    let tables = session.tables();
    let mut state =
        QueryState::new(tables, session.backend(), TableKind::Main(target.entity_type)).secured(session.principal());
    let main = state.main.clone();

    if let Some(parent) = &target.parent {
        if parent.navigation.target() != target.entity_type {
            return Err(PersistenceError::invalid(format!(
                "{} does not lead to {}",
                parent.navigation, target.entity_type
            )));
        }
        let relation = tables.main(parent.entity_type).relation(parent.navigation)?;
        if let Some(condition) = relation.restrict_to_parent(&mut state, &main, &parent.id) {
            state.select.and_where(condition);
        }
    }
    if let Some(condition) = state.security_condition(&main) {
        state.select.and_where(condition);
    }
    if let Some(filter) = filter {
        let condition = compile_filter(&mut state, &main, filter)?;
        state.select.and_where(condition);
    }
    Ok(state)
}

async fn count_restricted(session: &Session<'_>, state: &QueryState<'_>) -> PersistenceResult<u64> {
    let mut count = state.select.clone();
    count.expr_as(
        Func::count_distinct(Expr::col(state.main.column(ID_COLUMN))),
        Alias::new("N"),
    );
    let row = sql::query_one(session.tx(), &count).await?;
    let n = match row {
        Some(row) => row.try_get::<i64>("", "N")?,
        None => 0,
    };
    Ok(u64::try_from(n).unwrap_or_default())
}

fn apply_ordering(session: &Session<'_>, state: &mut QueryState<'_>, query: &Query) -> PersistenceResult<()> {
    let main = state.main.clone();
    for order in &query.order_by {
        let direction = match order.direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        };
        for expr in order_expressions(state, &main, &order.path)? {
            state.select.order_by_expr(expr, direction.clone());
        }
    }
    for (expr, order) in std::mem::take(&mut state.rank_order) {
        state.select.order_by_expr(expr, order);
    }
    if session.settings().always_order_by_id {
        state.select.order_by(main.column(ID_COLUMN), Order::Asc);
    }
    Ok(())
}

/// One entity by id with the `select`/`expand` options of `query`.
pub(crate) async fn get_entity(
    session: &Session<'_>,
    entity_type: EntityType,
    id: &Id,
    query: &Query,
) -> PersistenceResult<Option<Entity>> {
    let table = session.tables().main(entity_type);
    let hidden = hidden_properties(table, session);
    let mut state = restricted(session, &QueryTarget::all(entity_type), None)?;
    let main = state.main.clone();
    state
        .select
        .and_where(Expr::col(main.column(ID_COLUMN)).eq(sql::id_value(id)))
        .limit(1);
    let projection = Projection::new(table, &query.select, &hidden);
    projection.apply(table, &mut state)?;

    let Some(row) = sql::query_one(session.tx(), &state.select).await? else {
        return Ok(None);
    };
    let mut size = DataSize::new(session.settings().max_data_size);
    let mut entity = projection.read(table, &row, session.id_type(), &mut size)?;
    expand_entity(session, &mut entity, &query.expand).await?;
    Ok(Some(entity))
}

/// Current state of one entity with all properties, regardless of security wrappers.
pub(crate) async fn load_by_id(session: &Session<'_>, table: &TableDescriptor, id: &Id) -> PersistenceResult<Option<Entity>> {
    let mut state = QueryState::new(session.tables(), session.backend(), table.kind());
    let main = state.main.clone();
    state
        .select
        .and_where(Expr::col(main.column(ID_COLUMN)).eq(sql::id_value(id)))
        .limit(1);
    let projection = Projection::new(table, &[], &[]);
    projection.apply(table, &mut state)?;
    let Some(row) = sql::query_one(session.tx(), &state.select).await? else {
        return Ok(None);
    };
    let mut size = DataSize::new(session.settings().max_data_size);
    projection.read(table, &row, session.id_type(), &mut size).map(Some)
}

/// A page of entities of `target`.
///
/// At most `top` entities are returned; `has_more` is set when more matched, or when
/// the page was cut short by the payload limit.
pub(crate) async fn query_entities(
    session: &Session<'_>,
    target: &QueryTarget,
    query: &Query,
) -> PersistenceResult<EntitySet> {
    let settings = session.settings();
    let table = session.tables().main(target.entity_type);
    let hidden = hidden_properties(table, session);
    let mut state = restricted(session, target, query.filter.as_ref())?;

    let count = if query.count.unwrap_or(settings.count_by_default) {
        Some(count_restricted(session, &state).await?)
    } else {
        None
    };

    let projection = Projection::new(table, &query.select, &hidden);
    projection.apply(table, &mut state)?;
    apply_ordering(session, &mut state, query)?;
    let top = settings.effective_top(query.top);
    state.select.limit(top.saturating_add(1));
    if let Some(skip) = query.skip {
        state.select.offset(skip);
    }
    let rows = sql::query_all(session.tx(), &state.select).await?;

    let mut set = EntitySet::new(target.entity_type);
    if let Some(parent) = &target.parent {
        set = set.with_navigation_link(parent.navigation);
    }
    let mut size = DataSize::new(settings.max_data_size);
    for (index, row) in rows.iter().enumerate() {
        if index as u64 >= top {
            set.set_has_more(true);
            break;
        }
        set.push(projection.read(table, row, session.id_type(), &mut size)?);
        if size.exceeded() {
            tracing::debug!(bytes = size.total(), "page cut short by the payload limit");
            set.set_has_more(index + 1 < rows.len());
            break;
        }
    }
    for entity in set.entities_mut() {
        expand_entity(session, entity, &query.expand).await?;
    }
    if let Some(count) = count {
        set.set_count(count);
    }
    Ok(set)
}

/// Number of entities of `target` matching the filter of `query`.
pub(crate) async fn count_entities(session: &Session<'_>, target: &QueryTarget, query: &Query) -> PersistenceResult<u64> {
    let state = restricted(session, target, query.filter.as_ref())?;
    count_restricted(session, &state).await
}

/// Ids of every entity of `target` matching `filter`, unpaged.
pub(crate) async fn matching_ids(
    session: &Session<'_>,
    target: &QueryTarget,
    filter: &Expression,
) -> PersistenceResult<Vec<Id>> {
    let mut state = restricted(session, target, Some(filter))?;
    let main = state.main.clone();
    state
        .select
        .column(main.column(ID_COLUMN))
        .order_by(main.column(ID_COLUMN), Order::Asc);
    let id_type = session.id_type();
    sql::query_all(session.tx(), &state.select)
        .await?
        .iter()
        .map(|row| sql::require_id(row, ID_COLUMN, id_type))
        .collect()
}

/// Replace the links named in `expands` by the expanded entities, recursively.
fn expand_entity<'s, 'a: 's>(
    session: &'s Session<'a>,
    entity: &'s mut Entity,
    expands: &'s [Expand],
) -> BoxFuture<'s, PersistenceResult<()>> {
    Box::pin(async move {
        if expands.is_empty() {
            return Ok(());
        }
        let entity_type = entity.entity_type();
        let id = entity
            .id()
            .cloned()
            .ok_or_else(|| PersistenceError::internal(format!("can not expand a {entity_type} without id")))?;
        for expand in expands {
            let nav = expand.navigation;
            if !entity_type.has_navigation(nav) {
                return Err(PersistenceError::invalid(format!("{entity_type} has no navigation property {nav}")));
            }
            let target = QueryTarget::related(entity_type, id.clone(), nav);
            let link = if nav.is_set() {
                Link::Many(query_entities(session, &target, &expand.query).await?)
            } else {
                let mut query = expand.query.clone();
                query.top = Some(1);
                query.count = Some(false);
                let linked = query_entities(session, &target, &query).await?;
                Link::One(linked.into_entities().into_iter().next().map(Box::new))
            };
            entity.set_link(nav, link);
        }
        Ok(())
    })
}
