//! Contract layer - transport-agnostic model shared with collaborators
//!
//! Entities, identifiers, the parsed query tree and the error taxonomy.

pub mod entity;
pub mod error;
pub mod id;
pub mod model;
pub mod principal;
pub mod query;
pub mod value;

pub use entity::{Entity, EntitySet, Link};
pub use error::{PersistenceError, PersistenceResult};
pub use id::{Id, IdType};
pub use model::{EntityProperty, EntityType, NavProperty, Property};
pub use principal::Principal;
pub use query::{
    CompareOp, Direction, Expand, Expression, Literal, Operand, OrderBy, ParentRef,
    PropertyPath, Query, QueryTarget,
};
pub use value::{PropertyValue, ResultValue, TimeValue};
