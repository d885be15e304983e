//! SensorThings Store
//!
//! Relational persistence core for the OGC SensorThings entity model: maps entities
//! onto tables, translates parsed queries into SQL, and enforces the model's
//! relationship rules (location history, generated features of interest, stream
//! exclusivity of observations) inside the caller's transaction.

// Public exports
pub mod contract;
pub use contract::{
    CompareOp, Direction, Entity, EntityProperty, EntitySet, EntityType, Expression, Id, IdType,
    Link, Literal, NavProperty, PersistenceError, PersistenceResult, Principal, PropertyPath,
    PropertyValue, Query, QueryTarget, ResultValue, TimeValue,
};

pub mod config;
pub use config::{AuthorizationSettings, IdGenerationMode, PersistenceSettings, RoleOverride};

pub mod domain;
pub use domain::{
    AuthorizationHooks, ChangeKind, ChangeNotice, EntityChangedMessage, EventPublisher,
    NoOpEventPublisher, PersistenceManager, Session,
};

// Extension points for plugins
pub mod infra;
pub use infra::storage::{
    HookPostDelete, HookPostInsert, HookPostUpdate, HookPreDelete, HookPreInsert, HookPreUpdate,
    InsertPhase, SecurityWrapper, TableModifier, TableRegistry,
};
