//! Already-parsed query tree
//!
//! Parsing the textual query language is done elsewhere; this module only defines the
//! validated tree the persistence core translates into SQL.

use chrono::{DateTime, Utc};

use super::id::Id;
use super::model::{EntityProperty, EntityType, NavProperty};

/// Query options of a read request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Entity properties to return; empty means all default properties
    pub select: Vec<EntityProperty>,
    pub expand: Vec<Expand>,
    pub filter: Option<Expression>,
    pub order_by: Vec<OrderBy>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    /// Request the total number of matching entities
    pub count: Option<bool>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, properties: impl IntoIterator<Item = EntityProperty>) -> Self {
        self.select.extend(properties);
        self
    }

    pub fn expand(mut self, navigation: NavProperty, query: Query) -> Self {
        self.expand.push(Expand { navigation, query });
        self
    }

    pub fn filter(mut self, expression: Expression) -> Self {
        self.filter = Some(expression);
        self
    }

    pub fn order_by(mut self, path: PropertyPath, direction: Direction) -> Self {
        self.order_by.push(OrderBy { path, direction });
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_count(mut self, count: bool) -> Self {
        self.count = Some(count);
        self
    }
}

/// Expansion of one navigation property, with its own nested query options
#[derive(Debug, Clone, PartialEq)]
pub struct Expand {
    pub navigation: NavProperty,
    pub query: Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub path: PropertyPath,
    pub direction: Direction,
}

/// Path to a property, optionally through navigation properties and into sub-fields
///
/// `Datastream/Thing/properties/owner` has navigation `[Datastream, Thing]`, property
/// `properties` and sub-path `["owner"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPath {
    pub navigation: Vec<NavProperty>,
    pub property: EntityProperty,
    pub sub_path: Vec<String>,
}

impl PropertyPath {
    pub fn property(property: EntityProperty) -> Self {
        Self {
            navigation: Vec::new(),
            property,
            sub_path: Vec::new(),
        }
    }

    pub fn through(navigation: impl IntoIterator<Item = NavProperty>, property: EntityProperty) -> Self {
        Self {
            navigation: navigation.into_iter().collect(),
            property,
            sub_path: Vec::new(),
        }
    }

    pub fn sub(mut self, segment: impl Into<String>) -> Self {
        self.sub_path.push(segment.into());
        self
    }
}

/// Literal values appearing in filters
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Time(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(PropertyPath),
    Literal(Literal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Boolean filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    Contains {
        path: PropertyPath,
        value: String,
    },
    StartsWith {
        path: PropertyPath,
        value: String,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    /// `path op literal`
    pub fn compare(path: PropertyPath, op: CompareOp, literal: Literal) -> Self {
        Self::Compare {
            op,
            left: Operand::Path(path),
            right: Operand::Literal(literal),
        }
    }

    pub fn and(self, other: Expression) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expression) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// Entity set a read addresses, optionally reached through a parent entity
///
/// `Things(1)/Datastreams` is `QueryTarget::related(Thing, 1, Datastreams)`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTarget {
    pub entity_type: EntityType,
    pub parent: Option<ParentRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParentRef {
    pub entity_type: EntityType,
    pub id: Id,
    pub navigation: NavProperty,
}

impl QueryTarget {
    pub fn all(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            parent: None,
        }
    }

    pub fn related(parent_type: EntityType, parent_id: impl Into<Id>, navigation: NavProperty) -> Self {
        Self {
            entity_type: navigation.target(),
            parent: Some(ParentRef {
                entity_type: parent_type,
                id: parent_id.into(),
                navigation,
            }),
        }
    }
}
