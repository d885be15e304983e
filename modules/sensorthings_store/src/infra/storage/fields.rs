//! Property ↔ column mapping of a table
//!
//! Every entity property of a table is backed by one or more named fields. The
//! converter registered with the property moves values between an [`Entity`] and the
//! columns of a row, in both directions.

use std::collections::BTreeMap;
use std::sync::Arc;

use sea_orm::sea_query::SimpleExpr;
use sea_orm::{DbBackend, QueryResult, Value};

use crate::contract::{Entity, EntityProperty, PersistenceError, PersistenceResult, Property};

use super::sql;
use super::table::TableRef;

/// Column values of a row being inserted or updated, keyed by column name
pub type ColumnValues = BTreeMap<String, Value>;

/// A column backing (part of) a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedField {
    /// Name used in sub-paths, e.g. `start` of an interval
    pub name: &'static str,
    pub column: &'static str,
    /// Whether the column is part of projections; write-only columns are not
    pub select: bool,
}

impl NamedField {
    pub const fn new(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column,
            select: true,
        }
    }

    pub const fn single(column: &'static str) -> Self {
        Self::new("value", column)
    }

    /// A column that is written but never read back, such as a derived geometry
    pub const fn no_select(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column,
            select: false,
        }
    }
}

/// How a property's fields take part in filters and ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Plain,
    /// JSON document; sub-paths address values inside it
    Json,
    /// `start`/`end` pair; instants have a NULL end
    Interval,
    /// Observation result; the column used depends on the compared literal
    Result,
    /// Several independent columns, only addressable through a sub-path
    Composite,
}

/// Accumulated size of unbounded fields read in one request
#[derive(Debug, Clone, Copy)]
pub struct DataSize {
    total: usize,
    max: usize,
}

impl DataSize {
    pub fn new(max: usize) -> Self {
        Self { total: 0, max }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    pub fn add(&mut self, bytes: usize) {
        self.total = self.total.saturating_add(bytes);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn exceeded(&self) -> bool {
        self.total > self.max
    }
}

/// Properties touched by an update
#[derive(Debug, Clone, Default)]
pub struct ChangeRecord {
    changed: Vec<Property>,
}

impl ChangeRecord {
    pub fn record(&mut self, property: impl Into<Property>) {
        let property = property.into();
        if !self.changed.contains(&property) {
            self.changed.push(property);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn into_properties(self) -> Vec<Property> {
        self.changed
    }
}

/// Moves one property between entities and rows
pub trait PropertyConverter: Send + Sync {
    /// Materialise the property from a result row into `entity`.
    fn read(&self, row: &QueryResult, entity: &mut Entity, size: &mut DataSize) -> PersistenceResult<()>;

    /// Put the insert values of the property into `row`.
    fn to_insert(&self, entity: &Entity, row: &mut ColumnValues) -> PersistenceResult<()>;

    /// Put the update assignments of the property into `row` and record the change.
    fn to_update(&self, entity: &Entity, row: &mut ColumnValues, changes: &mut ChangeRecord) -> PersistenceResult<()>;

    fn shape(&self) -> FieldShape {
        FieldShape::Plain
    }
}

/// Registered fields and converter of one property
#[derive(Clone)]
pub struct PropertyFields {
    pub property: EntityProperty,
    pub fields: Vec<NamedField>,
    pub converter: Arc<dyn PropertyConverter>,
}

impl PropertyFields {
    pub fn select_fields(&self) -> impl Iterator<Item = &NamedField> {
        self.fields.iter().filter(|f| f.select)
    }

    fn field(&self, name: &str) -> Option<&NamedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn primary(&self) -> PersistenceResult<&NamedField> {
        self.fields
            .first()
            .ok_or_else(|| PersistenceError::Configuration(format!("property {} has no fields", self.property)))
    }
}

/// A property (or a part of one) resolved to SQL expressions against a table
#[derive(Debug, Clone)]
pub enum ResolvedField {
    /// The identifier column; literals are converted to the configured id type
    Key(SimpleExpr),
    Column(SimpleExpr),
    /// Text extracted from inside a JSON document
    JsonPath(SimpleExpr),
    Interval {
        start: SimpleExpr,
        end: SimpleExpr,
    },
    Result {
        /// RESULT_TYPE discriminator
        kind: SimpleExpr,
        number: SimpleExpr,
        string: SimpleExpr,
        boolean: SimpleExpr,
        json: SimpleExpr,
    },
    Composite(Vec<SimpleExpr>),
}

impl ResolvedField {
    /// Expressions to sort by, in order
    pub fn order_expressions(self) -> Vec<SimpleExpr> {
        match self {
            Self::Key(e) | Self::Column(e) | Self::JsonPath(e) => vec![e],
            Self::Interval { start, end } => vec![start, end],
            Self::Result { number, string, .. } => vec![number, string],
            Self::Composite(exprs) => exprs,
        }
    }
}

/// Property → field registry of one table
#[derive(Clone, Default)]
pub struct PropertyFieldRegistry {
    entries: BTreeMap<EntityProperty, PropertyFields>,
}

impl PropertyFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the fields and converter of a property, replacing an earlier entry.
    pub fn add_entry(
        &mut self,
        property: EntityProperty,
        converter: impl PropertyConverter + 'static,
        fields: Vec<NamedField>,
    ) {
        self.entries.insert(
            property,
            PropertyFields {
                property,
                fields,
                converter: Arc::new(converter),
            },
        );
    }

    pub fn contains(&self, property: EntityProperty) -> bool {
        self.entries.contains_key(&property)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PropertyFields> {
        self.entries.values()
    }

    /// Fields of one property; unknown properties are a caller error.
    pub fn fields_for_property(&self, property: EntityProperty) -> PersistenceResult<&PropertyFields> {
        self.entries
            .get(&property)
            .ok_or_else(|| PersistenceError::invalid(format!("unknown property {property}")))
    }

    /// Entries of the selected properties, or of all properties when `selected` is empty
    pub fn selected_entries<'r>(&'r self, selected: &'r [EntityProperty]) -> impl Iterator<Item = &'r PropertyFields> {
        self.entries
            .values()
            .filter(move |e| selected.is_empty() || selected.contains(&e.property))
    }

    /// Resolve `property` (plus an optional sub-path) against `table`.
    pub fn resolve(
        &self,
        backend: DbBackend,
        table: &TableRef,
        property: EntityProperty,
        sub_path: &[String],
    ) -> PersistenceResult<ResolvedField> {
        if property == EntityProperty::Id {
            if !sub_path.is_empty() {
                return Err(PersistenceError::invalid("the id has no sub-properties"));
            }
            return Ok(ResolvedField::Key(table.col(sql::ID_COLUMN)));
        }
        let entry = self.fields_for_property(property)?;
        let shape = entry.converter.shape();

        if let Some(first) = sub_path.first() {
            if sub_path.len() == 1 {
                if let Some(field) = entry.field(first) {
                    return Ok(ResolvedField::Column(table.col(field.column)));
                }
            }
            if shape != FieldShape::Json {
                return Err(PersistenceError::invalid(format!(
                    "property {property} has no sub-property {}",
                    sub_path.join("/")
                )));
            }
            validate_json_path(sub_path)?;
            let column = table.col(entry.primary()?.column);
            return Ok(ResolvedField::JsonPath(sql::json_path_expr(backend, column, sub_path)));
        }

        let column = |name: &str| -> PersistenceResult<SimpleExpr> {
            entry
                .field(name)
                .map(|f| table.col(f.column))
                .ok_or_else(|| PersistenceError::Configuration(format!("property {property} lacks field {name}")))
        };
        Ok(match shape {
            FieldShape::Plain | FieldShape::Json => ResolvedField::Column(table.col(entry.primary()?.column)),
            FieldShape::Interval => ResolvedField::Interval {
                start: column("start")?,
                end: column("end")?,
            },
            FieldShape::Result => ResolvedField::Result {
                kind: column("type")?,
                number: column("number")?,
                string: column("string")?,
                boolean: column("boolean")?,
                json: column("json")?,
            },
            FieldShape::Composite => {
                ResolvedField::Composite(entry.select_fields().map(|f| table.col(f.column)).collect())
            }
        })
    }
}

fn validate_json_path(segments: &[String]) -> PersistenceResult<()> {
    for segment in segments {
        let valid = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistenceError::invalid(format!("invalid path segment '{segment}'")));
        }
    }
    Ok(())
}
