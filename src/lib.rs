//! Entity Binder - polymorphic wishlist/blacklist associations
//!
//! Lets an author (any registered entity, usually a user acting alone or on
//! behalf of an organisation) mark arbitrary entities as wishlisted,
//! blacklisted, or any other configured relation kind.
//!
//! ## Architecture
//!
//! - **Registry**: maps type identifiers such as `catalog.Item` to an
//!   existence check, so the engine never needs to know entity shapes
//! - **Relation store**: one row per (author, target, kind) triple in SQLite,
//!   uniqueness enforced by a composite index
//! - **Association service**: validates, writes and emits notifications
//! - **HTTP API**: thin adapter; the caller's identity comes from gateway headers
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/entity-binder/
//! ├── binder.db      # SQLite (binds, schema_version, optional entity tables)
//! └── config.toml    # Configuration
//! ```
//!
//! ## Embedding
//!
//! ```no_run
//! use std::sync::Arc;
//! use entity_binder::{
//!     BinderDb, EntityKey, EntityRef, EntityTypeDescriptor, EntityTypeRegistry,
//!     EventBus, KeySet, RelationKind, Services,
//! };
//!
//! # fn main() -> Result<(), entity_binder::BinderError> {
//! let registry = EntityTypeRegistry::builder()
//!     .register(EntityTypeDescriptor::new("catalog.Item", "item", Arc::new(KeySet::new([9u64]))))?
//!     .build();
//! let db = Arc::new(BinderDb::open_in_memory()?);
//! let services = Services::sqlite(db, Arc::new(registry), Arc::new(EventBus::new()));
//!
//! let user = EntityRef::new("user.User", EntityKey::from(1));
//! services.association.add(&user, "catalog.Item", &EntityKey::from(9), &RelationKind::WISHLIST)?;
//! # Ok(())
//! # }
//! ```

pub mod annotate;
pub mod author;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod model;
pub mod registry;
pub mod services;
pub mod store;

// Re-exports
pub use annotate::{BindState, StateAnnotator};
pub use author::{
    AuthorResolver, DefaultAuthorResolver, DelegationResolver, HeaderPrincipalExtractor, Principal,
};
pub use config::{Config, EntityTypeConfig};
pub use db::BinderDb;
pub use error::BinderError;
pub use http::{BindApi, HttpServer};
pub use model::{AssociationCapable, Bind, BindAction, EntityKey, EntityRef, RelationKind};
pub use registry::{
    EntityExistence, EntityTypeDescriptor, EntityTypeRegistry, KeySet, SqlTableExistence,
};
pub use services::{AssociationService, BinderEvent, EventBus, EventListener, Services};
pub use store::{RelationStore, SqliteRelationStore};
