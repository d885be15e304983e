//! Contract error types for the persistence core
//!
//! These errors are transport-agnostic. Mapping them to protocol status codes is the
//! caller's job; nothing in this crate retries on any of them.

use sea_orm::DbErr;
use thiserror::Error;

use super::model::EntityType;

/// Persistence core errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A referenced or targeted entity does not exist
    #[error("no such entity: {entity_type} {id}")]
    NoSuchEntity {
        /// Type of the missing entity
        entity_type: EntityType,
        /// Identifier that was looked up (display form)
        id: String,
    },

    /// A required relation or property is missing
    #[error("incomplete entity: {0}")]
    IncompleteEntity(String),

    /// Unknown navigation/relation name, malformed path or a violated business rule
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An invariant of the storage layer itself was violated; never user-correctable
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),

    /// An authorization hook rejected the operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Table wiring or initialisation failed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Error reported by the database
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl PersistenceError {
    pub fn no_such_entity(entity_type: EntityType, id: impl std::fmt::Display) -> Self {
        Self::NoSuchEntity {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::IncompleteEntity(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalConsistency(message.into())
    }

    /// Whether the caller can fix the request that produced this error.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NoSuchEntity { .. }
                | Self::IncompleteEntity(_)
                | Self::InvalidArgument(_)
                | Self::Forbidden(_)
        )
    }
}

/// Result alias used throughout the crate
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_classified() {
        assert!(PersistenceError::no_such_entity(EntityType::Thing, 7).is_user_error());
        assert!(PersistenceError::invalid("bad path").is_user_error());
        assert!(!PersistenceError::internal("two rows updated").is_user_error());
        assert!(!PersistenceError::Configuration("missing relation".into()).is_user_error());
    }

    #[test]
    fn no_such_entity_message_names_type_and_id() {
        let err = PersistenceError::no_such_entity(EntityType::Location, 42);
        assert_eq!(err.to_string(), "no such entity: Location 42");
    }
}
