//! Business rules of the entity model, installed as table hooks

mod historical_locations;
mod locations;
mod multi_datastreams;
mod observations;
mod tasks;

use crate::infra::storage::TableRegistry;

/// Priority of the built-in rules; hooks registered by plugins may run around them
pub const RULE_PRIORITY: f64 = 0.0;

/// Register the built-in rules on `registry`.
pub(crate) fn install(registry: &mut TableRegistry) {
    observations::install(registry);
    multi_datastreams::install(registry);
    locations::install(registry);
    historical_locations::install(registry);
    tasks::install(registry);
}
