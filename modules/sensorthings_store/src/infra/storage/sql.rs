//! Statement execution and value conversion helpers

use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use sea_orm::{
    ConnectionTrait, DbBackend, ExecResult, QueryResult, StatementBuilder, Value,
};
use uuid::Uuid;

use crate::contract::{Id, IdType, PersistenceError, PersistenceResult};

/// Name of the identifier column of every entity table
pub const ID_COLUMN: &str = "ID";

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> PersistenceResult<ExecResult>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    tracing::debug!(sql = %statement.sql, "execute");
    Ok(conn.execute(statement).await?)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> PersistenceResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    tracing::debug!(sql = %statement.sql, "query one");
    Ok(conn.query_one(statement).await?)
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> PersistenceResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let statement = conn.get_database_backend().build(stmt);
    tracing::debug!(sql = %statement.sql, "query all");
    Ok(conn.query_all(statement).await?)
}

/// Bind value of an identifier
pub fn id_value(id: &Id) -> Value {
    match id {
        Id::Long(v) => Value::from(*v),
        Id::String(v) => Value::from(v.clone()),
        Id::Uuid(v) => Value::from(*v),
    }
}

/// Typed null for an identifier column
pub fn null_id_value(id_type: IdType) -> Value {
    match id_type {
        IdType::Long => Value::BigInt(None),
        IdType::String => Value::String(None),
        IdType::Uuid => Value::Uuid(None),
    }
}

/// Recover an identifier from a bind value (e.g. a foreign key placed in an insert row).
pub fn id_from_value(value: &Value) -> Option<Id> {
    match value {
        Value::BigInt(Some(v)) => Some(Id::Long(*v)),
        Value::Int(Some(v)) => Some(Id::Long(i64::from(*v))),
        Value::String(Some(v)) => Some(Id::String(String::clone(v))),
        Value::Uuid(Some(v)) => Some(Id::Uuid(Uuid::clone(v))),
        _ => None,
    }
}

pub fn is_null_value(value: &Value) -> bool {
    matches!(
        value,
        Value::BigInt(None)
            | Value::Int(None)
            | Value::String(None)
            | Value::Uuid(None)
            | Value::Bool(None)
            | Value::Double(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::SmallInt(None)
    )
}

/// Read an identifier column; `Ok(None)` for SQL NULL.
pub fn read_id(row: &QueryResult, column: &str, id_type: IdType) -> PersistenceResult<Option<Id>> {
    let id = match id_type {
        IdType::Long => row.try_get::<Option<i64>>("", column)?.map(Id::Long),
        IdType::String => row.try_get::<Option<String>>("", column)?.map(Id::String),
        IdType::Uuid => row.try_get::<Option<Uuid>>("", column)?.map(Id::Uuid),
    };
    Ok(id)
}

/// Read a non-null identifier column.
pub fn require_id(row: &QueryResult, column: &str, id_type: IdType) -> PersistenceResult<Id> {
    read_id(row, column, id_type)?
        .ok_or_else(|| PersistenceError::internal(format!("column {column} is unexpectedly null")))
}

/// `column = id` against an unaliased table, used by UPDATE and DELETE statements.
pub fn key_equals(column: &str, id: &Id) -> SimpleExpr {
    Expr::col(Alias::new(column)).eq(id_value(id))
}

/// JSON text extraction at `segments`, per backend.
pub(crate) fn json_path_expr(backend: DbBackend, column: SimpleExpr, segments: &[String]) -> SimpleExpr {
    match backend {
        DbBackend::Postgres => {
            let path = format!("{{{}}}", segments.join(","));
            Expr::cust_with_exprs(
                "(CAST($1 AS jsonb) #>> CAST($2 AS text[]))",
                [column, Expr::val(path).into()],
            )
        }
        _ => {
            let mut path = String::from("$");
            for segment in segments {
                if segment.chars().all(|c| c.is_ascii_digit()) {
                    path.push_str(&format!("[{segment}]"));
                } else {
                    path.push('.');
                    path.push_str(segment);
                }
            }
            Expr::cust_with_exprs("json_extract($1, $2)", [column, Expr::val(path).into()])
        }
    }
}
