//! Association service - business rules for binds
//!
//! Wraps the relation store with registry validation and event emission.
//!
//! `add` validates strictly before touching the store: the type must resolve
//! and the target must exist. `remove` only resolves the type; a target that
//! was deleted elsewhere can still be unbound, because the bind's own
//! existence is the only thing being asserted.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::current_timestamp;
use crate::error::BinderError;
use crate::model::{Bind, EntityKey, EntityRef, RelationKind};
use crate::registry::{is_well_formed_type_id, EntityTypeDescriptor, EntityTypeRegistry};
use crate::store::RelationStore;

use super::events::{BinderEvent, EventBus};

/// Association service for wishlist/blacklist-style binds
pub struct AssociationService {
    registry: Arc<EntityTypeRegistry>,
    store: Arc<dyn RelationStore>,
    events: Arc<EventBus>,
}

impl AssociationService {
    pub fn new(
        registry: Arc<EntityTypeRegistry>,
        store: Arc<dyn RelationStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            events,
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Bind `author` to a target under `kind`
    pub fn add(
        &self,
        author: &EntityRef,
        target_type_id: &str,
        target_key: &EntityKey,
        kind: &RelationKind,
    ) -> Result<Bind, BinderError> {
        let descriptor = self.resolve_target_type(target_type_id)?;

        if !descriptor.accepts(kind) {
            warn!(target_type = %descriptor.type_id(), kind = %kind, "Rejected bind to ineligible type");
            return Err(BinderError::validation(
                "target_ct",
                descriptor.ineligible_message(kind),
            ));
        }

        if !descriptor.exists(target_key)? {
            warn!(
                target_type = %descriptor.type_id(),
                target_key = %target_key,
                "Rejected bind to missing target"
            );
            return Err(BinderError::validation(
                "target_object_id",
                descriptor.not_found_message(target_key),
            ));
        }

        let bind = Bind {
            id: Uuid::new_v4().to_string(),
            author: author.clone(),
            target: descriptor.entity_ref(target_key.clone()),
            kind: kind.clone(),
            created_at: current_timestamp(),
        };

        let bind = self.store.insert(bind).map_err(|e| match e {
            BinderError::DuplicateBind { target, kind, .. } => {
                debug!(target = %target, kind = %kind, "Bind already exists");
                BinderError::Conflict(format!("{} is already in {}", target, kind))
            }
            other => other,
        })?;

        info!(kind = %bind.kind, author = %bind.author, target = %bind.target, "Bind added");
        self.events.emit(BinderEvent::added(bind.clone()));

        Ok(bind)
    }

    /// Remove the bind for a triple; the target itself is not re-checked
    pub fn remove(
        &self,
        author: &EntityRef,
        target_type_id: &str,
        target_key: &EntityKey,
        kind: &RelationKind,
    ) -> Result<Bind, BinderError> {
        let descriptor = self.resolve_target_type(target_type_id)?;
        let target = descriptor.entity_ref(target_key.clone());

        match self.store.delete(author, &target, kind)? {
            Some(bind) => {
                info!(kind = %bind.kind, author = %bind.author, target = %bind.target, "Bind removed");
                self.events.emit(BinderEvent::removed(bind.clone()));
                Ok(bind)
            }
            None => Err(BinderError::NotFound(format!(
                "{} is not in {}",
                target, kind
            ))),
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Whether `author` has bound `target` under `kind`
    ///
    /// Unknown target types are not an error here: nothing can be bound to them.
    pub fn is_bound(
        &self,
        author: &EntityRef,
        target: &EntityRef,
        kind: &RelationKind,
    ) -> Result<bool, BinderError> {
        let target = self.canonical(target);
        self.store.exists(author, &target, kind)
    }

    /// Targets of one type bound by `author` under `kind`
    pub fn list_bound_targets(
        &self,
        author: &EntityRef,
        target_type_id: &str,
        kind: &RelationKind,
    ) -> Result<Vec<EntityRef>, BinderError> {
        let descriptor = self.resolve_target_type(target_type_id)?;
        self.store.list_targets(author, kind, descriptor.type_id())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Resolve a payload type id, reporting failures against `target_ct`
    pub fn resolve_target_type(
        &self,
        target_type_id: &str,
    ) -> Result<&EntityTypeDescriptor, BinderError> {
        self.registry.resolve(target_type_id).map_err(|e| match e {
            BinderError::TypeNotFound(type_id) if is_well_formed_type_id(&type_id) => {
                BinderError::validation(
                    "target_ct",
                    format!("Content type with model={} does not exist.", type_id),
                )
            }
            BinderError::TypeNotFound(_) => BinderError::validation("target_ct", "Invalid value."),
            other => other,
        })
    }

    /// Rewrite a reference to its registered type id, if the type is registered
    fn canonical(&self, entity: &EntityRef) -> EntityRef {
        match self.registry.resolve(&entity.type_id) {
            Ok(descriptor) => descriptor.entity_ref(entity.key.clone()),
            Err(_) => entity.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<EntityTypeRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
