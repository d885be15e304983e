//! Configuration for the persistence core
//!
//! Loading (files, environment) is the host's concern; this only fixes the schema and
//! the defaults.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::contract::IdType;

/// Who may assign entity identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGenerationMode {
    /// Client supplied ids are rejected
    #[default]
    ServerGeneratedOnly,
    /// Client ids are used when present, generated otherwise
    ServerAndClientGenerated,
    /// Every created entity must carry a client id
    ClientGeneratedOnly,
}

/// Persistence settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceSettings {
    /// Identifier encoding of all tables
    #[serde(default)]
    pub id_type: IdType,

    #[serde(default)]
    pub id_generation_mode: IdGenerationMode,

    /// Upper bound for the unbounded fields materialised in one read (bytes)
    #[serde(default = "default_max_data_size")]
    pub max_data_size: usize,

    /// Page size when the query has no `top`
    #[serde(default = "default_top")]
    pub default_top: u64,

    /// Largest accepted `top`
    #[serde(default = "default_max_top")]
    pub max_top: u64,

    /// Append the id as last sort key so paging is stable
    #[serde(default = "default_true")]
    pub always_order_by_id: bool,

    /// Compute counts when the query does not say
    #[serde(default)]
    pub count_by_default: bool,

    #[serde(default)]
    pub authorization: AuthorizationSettings,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            id_type: IdType::default(),
            id_generation_mode: IdGenerationMode::default(),
            max_data_size: default_max_data_size(),
            default_top: default_top(),
            max_top: default_max_top(),
            always_order_by_id: true,
            count_by_default: false,
            authorization: AuthorizationSettings::default(),
        }
    }
}

impl PersistenceSettings {
    /// Effective page size for a requested `top`
    pub fn effective_top(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default_top).min(self.max_top)
    }
}

/// Role requirements checked by the authorization hooks
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_role_create")]
    pub role_create: String,

    #[serde(default = "default_role_update")]
    pub role_update: String,

    #[serde(default = "default_role_delete")]
    pub role_delete: String,

    /// Per entity type (by name, e.g. `Observation`) overrides of the roles above
    #[serde(default)]
    pub overrides: BTreeMap<String, RoleOverride>,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            role_create: default_role_create(),
            role_update: default_role_update(),
            role_delete: default_role_delete(),
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleOverride {
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

fn default_max_data_size() -> usize {
    25_000_000
}

fn default_top() -> u64 {
    100
}

fn default_max_top() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_role_create() -> String {
    "create".to_string()
}

fn default_role_update() -> String {
    "update".to_string()
}

fn default_role_delete() -> String {
    "delete".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: PersistenceSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.id_type, IdType::Long);
        assert_eq!(settings.id_generation_mode, IdGenerationMode::ServerGeneratedOnly);
        assert_eq!(settings.default_top, 100);
        assert!(settings.always_order_by_id);
        assert!(!settings.authorization.enabled);
        assert_eq!(settings.authorization.role_delete, "delete");
    }

    #[test]
    fn yaml_overrides_are_applied() {
        let yaml = r#"
id_type: uuid
id_generation_mode: server_and_client_generated
max_top: 50
authorization:
  enabled: true
  overrides:
    Observation:
      create: ingest
"#;
        let settings: PersistenceSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.id_type, IdType::Uuid);
        assert_eq!(settings.effective_top(Some(500)), 50);
        let obs = settings.authorization.overrides.get("Observation").unwrap();
        assert_eq!(obs.create.as_deref(), Some("ingest"));
        assert!(obs.delete.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<PersistenceSettings>(r#"{"idType":"long"}"#).is_err());
    }
}
