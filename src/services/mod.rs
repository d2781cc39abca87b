//! Service layer for entity-binder
//!
//! Services sit between the HTTP handler and the store:
//!
//! ```text
//! HTTP Handler (thin)
//!     ↓
//! Author Resolver + Association Service / State Annotator
//!     ↓
//! Relation Store (store.rs → db/binds.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod association;
pub mod events;
pub mod response;

pub use association::AssociationService;
pub use events::{BinderEvent, EventBus, EventListener};

use std::sync::Arc;

use crate::annotate::StateAnnotator;
use crate::author::{AuthorResolver, DefaultAuthorResolver};
use crate::db::BinderDb;
use crate::registry::EntityTypeRegistry;
use crate::store::{RelationStore, SqliteRelationStore};

/// Service container for dependency injection
///
/// Holds the engine components sharing one store, registry and event bus.
pub struct Services {
    pub association: Arc<AssociationService>,
    pub annotator: Arc<StateAnnotator>,
    pub authors: Arc<dyn AuthorResolver>,
    pub registry: Arc<EntityTypeRegistry>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over an arbitrary relation store
    pub fn new(
        store: Arc<dyn RelationStore>,
        registry: Arc<EntityTypeRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            association: Arc::new(AssociationService::new(
                registry.clone(),
                store.clone(),
                events.clone(),
            )),
            annotator: Arc::new(StateAnnotator::new(store, registry.clone())),
            authors: Arc::new(DefaultAuthorResolver),
            registry,
            events,
        }
    }

    /// Create all services over the SQLite store
    pub fn sqlite(db: Arc<BinderDb>, registry: Arc<EntityTypeRegistry>, events: Arc<EventBus>) -> Self {
        Self::new(Arc::new(SqliteRelationStore::new(db)), registry, events)
    }

    /// Replace the author resolver (principal delegation)
    pub fn with_author_resolver(mut self, resolver: Arc<dyn AuthorResolver>) -> Self {
        self.authors = resolver;
        self
    }
}
