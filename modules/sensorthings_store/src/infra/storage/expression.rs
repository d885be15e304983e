//! Filter and ordering translation
//!
//! Navigation hops inside filters become correlated `EXISTS` sub-queries, so a
//! to-many hop never multiplies the rows of the outer query. Ordering (and
//! comparisons between two paths) may only hop along to-one relations, which are
//! left-joined once per source alias.

use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{DbBackend, Value};

use crate::contract::{
    CompareOp, EntityType, Expression, Id, IdType, Literal, NavProperty, Operand,
    PersistenceError, PersistenceResult, PropertyPath,
};

use super::converters::time_value;
use super::fields::ResolvedField;
use super::result_codec::ResultKind;
use super::sql;
use super::state::QueryState;
use super::table::TableRef;

/// Compile `expression` into a condition on `table`.
pub(crate) fn compile_filter(
    state: &mut QueryState<'_>,
    table: &TableRef,
    expression: &Expression,
) -> PersistenceResult<SimpleExpr> {
    match expression {
        Expression::And(left, right) => {
            let left = compile_filter(state, table, left)?;
            let right = compile_filter(state, table, right)?;
            Ok(left.and(right))
        }
        Expression::Or(left, right) => {
            let left = compile_filter(state, table, left)?;
            let right = compile_filter(state, table, right)?;
            Ok(left.or(right))
        }
        Expression::Not(inner) => Ok(compile_filter(state, table, inner)?.not()),
        Expression::Contains { path, value } => {
            let pattern = format!("%{}%", escape_like(value));
            through_navigation(state, table, &path.navigation, |state, target| {
                Ok(Expr::expr(text_expr(state, target, path)?).like(LikeExpr::new(pattern).escape('\\')))
            })
        }
        Expression::StartsWith { path, value } => {
            let pattern = format!("{}%", escape_like(value));
            through_navigation(state, table, &path.navigation, |state, target| {
                Ok(Expr::expr(text_expr(state, target, path)?).like(LikeExpr::new(pattern).escape('\\')))
            })
        }
        Expression::Compare { op, left, right } => match (left, right) {
            (Operand::Path(path), Operand::Literal(literal)) => compare_path(state, table, path, *op, literal),
            (Operand::Literal(literal), Operand::Path(path)) => {
                compare_path(state, table, path, mirror(*op), literal)
            }
            (Operand::Path(left), Operand::Path(right)) => {
                let left = single_expr(state, table, left)?;
                let right = single_expr(state, table, right)?;
                Ok(apply(left, *op, right))
            }
            (Operand::Literal(_), Operand::Literal(_)) => {
                Err(PersistenceError::invalid("a comparison needs at least one property"))
            }
        },
    }
}

/// Sort expressions for `path`, joining to-one relations on the way.
pub(crate) fn order_expressions(
    state: &mut QueryState<'_>,
    table: &TableRef,
    path: &PropertyPath,
) -> PersistenceResult<Vec<SimpleExpr>> {
    let target = join_navigation(state, table, &path.navigation)?;
    Ok(resolve(state, &target, path)?.order_expressions())
}

fn table_type(table: &TableRef) -> PersistenceResult<EntityType> {
    table
        .kind()
        .entity_type()
        .ok_or_else(|| PersistenceError::internal(format!("{} is a link table", table.kind().name())))
}

fn resolve(state: &QueryState<'_>, table: &TableRef, path: &PropertyPath) -> PersistenceResult<ResolvedField> {
    state
        .tables
        .table(table.kind())
        .fields()
        .resolve(state.backend, table, path.property, &path.sub_path)
}

/// Wrap the condition built by `inner` into one `EXISTS` per navigation hop.
fn through_navigation<'t, F>(
    state: &mut QueryState<'t>,
    table: &TableRef,
    navigation: &[NavProperty],
    inner: F,
) -> PersistenceResult<SimpleExpr>
where
    F: FnOnce(&mut QueryState<'t>, &TableRef) -> PersistenceResult<SimpleExpr>,
{
    let Some((first, rest)) = navigation.split_first() else {
        return inner(state, table);
    };
    let tables = state.tables;
    let relation = tables.main(table_type(table)?).relation(*first)?;
    let semi_join = relation.semi_join_to(state, table);
    let target = semi_join.target.clone();
    let condition = through_navigation(state, &target, rest, inner)?;
    Ok(semi_join.exists(condition))
}

fn join_navigation(state: &mut QueryState<'_>, table: &TableRef, navigation: &[NavProperty]) -> PersistenceResult<TableRef> {
    let tables = state.tables;
    let mut current = table.clone();
    for nav in navigation {
        let relation = tables.main(table_type(&current)?).relation(*nav)?;
        if !relation.is_to_one() {
            return Err(PersistenceError::invalid(format!(
                "can not order or compare through the collection {nav}"
            )));
        }
        current = relation.join(state, &current)?;
    }
    Ok(current)
}

fn single_expr(state: &mut QueryState<'_>, table: &TableRef, path: &PropertyPath) -> PersistenceResult<SimpleExpr> {
    let target = join_navigation(state, table, &path.navigation)?;
    match resolve(state, &target, path)? {
        ResolvedField::Key(e) | ResolvedField::Column(e) | ResolvedField::JsonPath(e) => Ok(e),
        ResolvedField::Interval { start, .. } => Ok(start),
        ResolvedField::Result { number, .. } => Ok(number),
        ResolvedField::Composite(_) => Err(PersistenceError::invalid(format!(
            "{} can only be compared through one of its sub-properties",
            path.property
        ))),
    }
}

fn text_expr(state: &QueryState<'_>, table: &TableRef, path: &PropertyPath) -> PersistenceResult<SimpleExpr> {
    match resolve(state, table, path)? {
        ResolvedField::Column(e) | ResolvedField::JsonPath(e) => Ok(e),
        // numbers keep their exact text in the same column
        ResolvedField::Result { kind, string, .. } => Ok(Expr::case(is_kind(kind, ResultKind::String), string).into()),
        _ => Err(PersistenceError::invalid(format!("{} is not a text property", path.property))),
    }
}

fn compare_path(
    state: &mut QueryState<'_>,
    table: &TableRef,
    path: &PropertyPath,
    op: CompareOp,
    literal: &Literal,
) -> PersistenceResult<SimpleExpr> {
    through_navigation(state, table, &path.navigation, |state, target| {
        let id_type = state.tables.id_type();
        let backend = state.backend;
        compare_field(resolve(state, target, path)?, op, literal, id_type, backend)
    })
}

fn compare_field(
    field: ResolvedField,
    op: CompareOp,
    literal: &Literal,
    id_type: IdType,
    backend: DbBackend,
) -> PersistenceResult<SimpleExpr> {
    if *literal == Literal::Null {
        return match field {
            ResolvedField::Result { kind, json, .. } => {
                if !matches!(op, CompareOp::Eq | CompareOp::Ne) {
                    return Err(PersistenceError::invalid("null only compares with eq and ne"));
                }
                let json_null = is_kind(kind.clone(), ResultKind::Structured).and(Expr::expr(json).eq("null"));
                let is_null = Expr::expr(kind).is_null().or(json_null);
                Ok(if op == CompareOp::Eq { is_null } else { is_null.not() })
            }
            ResolvedField::Interval { start, .. } => null_check(start, op),
            ResolvedField::Key(e) | ResolvedField::Column(e) | ResolvedField::JsonPath(e) => null_check(e, op),
            ResolvedField::Composite(_) => Err(PersistenceError::invalid("compare a sub-property instead")),
        };
    }
    match field {
        ResolvedField::Key(column) => Ok(apply(column, op, sql::id_value(&key_literal(literal, id_type)?).into())),
        ResolvedField::Column(column) => Ok(apply(column, op, literal_value(literal).into())),
        ResolvedField::JsonPath(extracted) => Ok(compare_json(extracted, op, literal, backend)),
        ResolvedField::Interval { start, end } => {
            let value: SimpleExpr = literal_value(literal).into();
            let end_or_start: SimpleExpr = Func::coalesce([end, start.clone()]).into();
            Ok(match op {
                CompareOp::Gt | CompareOp::Ge => apply(start, op, value),
                CompareOp::Lt | CompareOp::Le => apply(end_or_start, op, value),
                CompareOp::Eq => apply(start, CompareOp::Eq, value.clone()).and(apply(end_or_start, CompareOp::Eq, value)),
                CompareOp::Ne => apply(start, CompareOp::Eq, value.clone())
                    .and(apply(end_or_start, CompareOp::Eq, value))
                    .not(),
            })
        }
        ResolvedField::Result { kind, number, string, boolean, .. } => {
            let value: SimpleExpr = literal_value(literal).into();
            match literal {
                Literal::Integer(_) | Literal::Number(_) => Ok(apply(number, op, value)),
                Literal::Bool(_) => Ok(apply(boolean, op, value)),
                Literal::String(_) => Ok(is_kind(kind, ResultKind::String).and(apply(string, op, value))),
                Literal::Time(_) | Literal::Null => {
                    Err(PersistenceError::invalid("results compare with numbers, booleans or strings"))
                }
            }
        }
        ResolvedField::Composite(_) => Err(PersistenceError::invalid("compare a sub-property instead")),
    }
}

fn is_kind(discriminator: SimpleExpr, kind: ResultKind) -> SimpleExpr {
    Expr::expr(discriminator).eq(kind.code())
}

fn null_check(expr: SimpleExpr, op: CompareOp) -> PersistenceResult<SimpleExpr> {
    match op {
        CompareOp::Eq => Ok(Expr::expr(expr).is_null()),
        CompareOp::Ne => Ok(Expr::expr(expr).is_not_null()),
        _ => Err(PersistenceError::invalid("null only compares with eq and ne")),
    }
}

/// JSON values extracted as text on PostgreSQL need a cast to compare as numbers.
fn compare_json(extracted: SimpleExpr, op: CompareOp, literal: &Literal, backend: DbBackend) -> SimpleExpr {
    match (backend, literal) {
        (DbBackend::Postgres, Literal::Integer(_) | Literal::Number(_)) => {
            let cast = Expr::cust_with_exprs("CAST($1 AS double precision)", [extracted]);
            apply(cast, op, literal_value(literal).into())
        }
        (DbBackend::Postgres, Literal::Bool(b)) => apply(extracted, op, Value::from(b.to_string()).into()),
        _ => apply(extracted, op, literal_value(literal).into()),
    }
}

fn key_literal(literal: &Literal, id_type: IdType) -> PersistenceResult<Id> {
    match (literal, id_type) {
        (Literal::Integer(v), IdType::Long) => Ok(Id::Long(*v)),
        (Literal::Integer(v), IdType::String) => Ok(Id::String(v.to_string())),
        (Literal::String(s), _) => id_type.parse(s),
        (other, _) => Err(PersistenceError::invalid(format!("{other:?} is not a valid id"))),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::String(None),
        Literal::Bool(b) => Value::from(*b),
        Literal::Integer(v) => Value::from(*v),
        Literal::Number(v) => Value::from(*v),
        Literal::String(s) => Value::from(s.clone()),
        Literal::Time(t) => time_value(Some(*t)),
    }
}

fn apply(left: SimpleExpr, op: CompareOp, right: SimpleExpr) -> SimpleExpr {
    let left = Expr::expr(left);
    match op {
        CompareOp::Eq => left.eq(right),
        CompareOp::Ne => left.ne(right),
        CompareOp::Gt => left.gt(right),
        CompareOp::Ge => left.gte(right),
        CompareOp::Lt => left.lt(right),
        CompareOp::Le => left.lte(right),
    }
}

/// `3 lt x` is `x gt 3`
fn mirror(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        same => same,
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::EntityProperty;
    use crate::infra::storage::collection::TableCollection;
    use crate::infra::storage::table::TableKind;
    use sea_orm::sea_query::SqliteQueryBuilder;

    fn sql_for(entity_type: EntityType, expression: &Expression) -> PersistenceResult<String> {
        let collection = TableCollection::new(IdType::Long);
        let tables = collection.init()?;
        let mut state = QueryState::new(tables, DbBackend::Sqlite, TableKind::Main(entity_type));
        let main = state.main.clone();
        let condition = compile_filter(&mut state, &main, expression)?;
        state.select.expr(Expr::val(1)).and_where(condition);
        Ok(state.select.to_string(SqliteQueryBuilder))
    }

    #[test]
    fn navigation_filters_use_exists() {
        let path = PropertyPath::through([NavProperty::Datastreams, NavProperty::Sensor], EntityProperty::Name);
        let sql = sql_for(EntityType::Thing, &Expression::compare(path, CompareOp::Eq, Literal::String("s".into()))).unwrap();
        assert_eq!(sql.matches("EXISTS").count(), 2, "{sql}");
        assert!(!sql.contains("JOIN \"SENSORS\""), "{sql}");
    }

    #[test]
    fn literal_on_the_left_is_mirrored() {
        let expression = Expression::Compare {
            op: CompareOp::Lt,
            left: Operand::Literal(Literal::Integer(3)),
            right: Operand::Path(PropertyPath::property(EntityProperty::Id)),
        };
        let sql = sql_for(EntityType::Thing, &expression).unwrap();
        assert!(sql.contains("\"e0\".\"ID\" > 3"), "{sql}");
    }

    #[test]
    fn instants_compare_through_coalesce() {
        let path = PropertyPath::property(EntityProperty::PhenomenonTime);
        let now = chrono::Utc::now();
        let sql = sql_for(EntityType::Observation, &Expression::compare(path, CompareOp::Le, Literal::Time(now))).unwrap();
        assert!(sql.contains("COALESCE"), "{sql}");
    }

    #[test]
    fn result_column_follows_the_literal() {
        let path = PropertyPath::property(EntityProperty::Result);
        let sql = sql_for(EntityType::Observation, &Expression::compare(path.clone(), CompareOp::Gt, Literal::Number(2.5))).unwrap();
        assert!(sql.contains("RESULT_NUMBER"), "{sql}");
        let sql = sql_for(EntityType::Observation, &Expression::compare(path, CompareOp::Eq, Literal::Bool(true))).unwrap();
        assert!(sql.contains("RESULT_BOOLEAN"), "{sql}");
    }

    #[test]
    fn text_and_null_results_check_the_discriminator() {
        let path = PropertyPath::property(EntityProperty::Result);
        let sql = sql_for(EntityType::Observation, &Expression::compare(path.clone(), CompareOp::Eq, Literal::String("42".into()))).unwrap();
        assert!(sql.contains("\"RESULT_TYPE\" = 2"), "{sql}");
        let sql = sql_for(EntityType::Observation, &Expression::compare(path, CompareOp::Eq, Literal::Null)).unwrap();
        assert!(sql.contains("\"RESULT_TYPE\" IS NULL"), "{sql}");
        assert!(sql.contains("\"RESULT_TYPE\" = 3"), "{sql}");
    }

    #[test]
    fn unknown_property_is_rejected() {
        let path = PropertyPath::property(EntityProperty::Result);
        let err = sql_for(EntityType::Thing, &Expression::compare(path, CompareOp::Eq, Literal::Integer(1))).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidArgument(_)));
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_a\\"), "50\\%\\_a\\\\");
    }
}
