//! Domain layer - sessions, business rules and change events

pub mod authorization;
pub mod events;
pub(crate) mod rules;
pub mod service;

pub use authorization::AuthorizationHooks;
pub use events::{ChangeKind, ChangeNotice, EntityChangedMessage, EventPublisher, NoOpEventPublisher};
pub use service::{PersistenceManager, Session};
