//! Entity identifiers
//!
//! The key encoding is chosen once per deployment; all tables share it.

use serde::Deserialize;
use std::fmt;
use uuid::Uuid;

use super::error::{PersistenceError, PersistenceResult};

/// Identifier value of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Id {
    Long(i64),
    String(String),
    Uuid(Uuid),
}

impl Id {
    pub fn id_type(&self) -> IdType {
        match self {
            Self::Long(_) => IdType::Long,
            Self::String(_) => IdType::String,
            Self::Uuid(_) => IdType::Uuid,
        }
    }

    pub fn as_json(&self) -> serde_json::Value {
        match self {
            Self::Long(v) => serde_json::Value::from(*v),
            Self::String(v) => serde_json::Value::from(v.clone()),
            Self::Uuid(v) => serde_json::Value::from(v.to_string()),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "'{v}'"),
            Self::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Id {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<&str> for Id {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Id {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Uuid> for Id {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

/// Identifier encoding used by all tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    #[default]
    Long,
    String,
    Uuid,
}

impl IdType {
    /// Parse an identifier from its textual form.
    pub fn parse(self, raw: &str) -> PersistenceResult<Id> {
        match self {
            Self::Long => raw
                .trim()
                .parse::<i64>()
                .map(Id::Long)
                .map_err(|_| PersistenceError::invalid(format!("not a valid integer id: {raw}"))),
            Self::String => {
                let trimmed = raw.trim();
                let unquoted = trimmed
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .unwrap_or(trimmed);
                Ok(Id::String(unquoted.replace("''", "'")))
            }
            Self::Uuid => {
                let trimmed = raw.trim().trim_matches('\'');
                Uuid::parse_str(trimmed)
                    .map(Id::Uuid)
                    .map_err(|_| PersistenceError::invalid(format!("not a valid uuid id: {raw}")))
            }
        }
    }

    /// Convert an id given as a JSON value (`@iot.id`) into an [`Id`].
    pub fn from_json(self, value: &serde_json::Value) -> PersistenceResult<Id> {
        match (self, value) {
            (Self::Long, serde_json::Value::Number(n)) => n
                .as_i64()
                .map(Id::Long)
                .ok_or_else(|| PersistenceError::invalid(format!("not a valid integer id: {n}"))),
            (_, serde_json::Value::String(s)) => self.parse(s),
            (Self::String, serde_json::Value::Number(n)) => Ok(Id::String(n.to_string())),
            (_, other) => Err(PersistenceError::invalid(format!(
                "value can not be used as id: {other}"
            ))),
        }
    }

    /// Generate a fresh identifier in-process, or `None` when the database assigns it.
    pub fn generate(self) -> Option<Id> {
        match self {
            Self::Long => None,
            Self::String => Some(Id::String(Uuid::new_v4().to_string())),
            Self::Uuid => Some(Id::Uuid(Uuid::new_v4())),
        }
    }

    /// Whether `id` is encoded the way this id type expects
    pub fn accepts(self, id: &Id) -> bool {
        id.id_type() == self
    }
}
