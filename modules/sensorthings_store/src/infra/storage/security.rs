//! Row- and column-level read restrictions

use sea_orm::sea_query::SimpleExpr;

use crate::contract::{EntityProperty, Principal};

use super::table::TableRef;

/// Restricts what a principal can read from one table
///
/// The wrapper applies to every read that touches its table, including the parent of
/// a navigation target and any table a filter path passes through. Writes are not
/// restricted.
pub trait SecurityWrapper: Send + Sync {
    /// Extra condition rows of `table` must satisfy; `None` leaves all rows visible.
    fn restrict(&self, table: &TableRef, principal: Option<&Principal>) -> Option<SimpleExpr>;

    /// Properties never returned to this principal
    fn hidden_properties(&self, _principal: Option<&Principal>) -> Vec<EntityProperty> {
        Vec::new()
    }
}
