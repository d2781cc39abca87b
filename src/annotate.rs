//! State annotation for read responses
//!
//! Rendering a page of targets with an `is_wishlisted` flag must not cost one
//! store query per target. [`StateAnnotator::load`] issues a single
//! `list_targets` call for (author, kind, target type) and the resulting
//! [`BindState`] answers membership from a hash set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::BinderError;
use crate::model::{EntityKey, EntityRef, RelationKind};
use crate::registry::EntityTypeRegistry;
use crate::store::RelationStore;

/// Batch bind lookups for one author, kind and target type
pub struct StateAnnotator {
    store: Arc<dyn RelationStore>,
    registry: Arc<EntityTypeRegistry>,
}

impl StateAnnotator {
    pub fn new(store: Arc<dyn RelationStore>, registry: Arc<EntityTypeRegistry>) -> Self {
        Self { store, registry }
    }

    /// Fetch the bound keys once
    pub fn load(
        &self,
        author: &EntityRef,
        kind: &RelationKind,
        target_type_id: &str,
    ) -> Result<BindState, BinderError> {
        let target_type = self
            .registry
            .resolve(target_type_id)
            .map(|d| d.type_id().to_string())
            .unwrap_or_else(|_| target_type_id.to_string());

        let bound: HashSet<EntityKey> = self
            .store
            .list_targets(author, kind, &target_type)?
            .into_iter()
            .map(|target| target.key)
            .collect();

        debug!(
            author = %author,
            kind = %kind,
            target_type = %target_type,
            bound = bound.len(),
            "Loaded bind state"
        );

        Ok(BindState {
            kind: kind.clone(),
            type_key: target_type.to_lowercase(),
            target_type,
            bound,
        })
    }

    /// Classify every candidate; candidates of another type are never bound
    pub fn annotate(
        &self,
        author: &EntityRef,
        kind: &RelationKind,
        target_type_id: &str,
        candidates: &[EntityRef],
    ) -> Result<HashMap<EntityRef, bool>, BinderError> {
        let state = self.load(author, kind, target_type_id)?;
        Ok(candidates
            .iter()
            .map(|candidate| (candidate.clone(), state.is_bound(candidate)))
            .collect())
    }
}

/// Result of one batch fetch
#[derive(Debug, Clone)]
pub struct BindState {
    kind: RelationKind,
    target_type: String,
    /// Case-folded like registry lookups
    type_key: String,
    bound: HashSet<EntityKey>,
}

impl BindState {
    pub fn is_bound(&self, target: &EntityRef) -> bool {
        self.bound.contains(&target.key) && target.type_id.to_lowercase() == self.type_key
    }

    /// Canonical id of the target type this state was loaded for
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn is_key_bound(&self, key: &EntityKey) -> bool {
        self.bound.contains(key)
    }

    /// Number of bound targets of this type
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Add the kind's state field (`is_wishlisted`, ...) to rendered objects
    ///
    /// `id_field` names the key inside each object. Objects without a usable
    /// id are marked unbound; non-objects are left untouched.
    pub fn annotate_json(&self, items: &mut [Value], id_field: &str) {
        let field = self.kind.state_field();
        for item in items.iter_mut() {
            let bound = match item.get(id_field) {
                Some(Value::String(s)) => EntityKey::new(s.as_str())
                    .map(|key| self.is_key_bound(&key))
                    .unwrap_or(false),
                Some(Value::Number(n)) => n
                    .as_u64()
                    .map(|n| self.is_key_bound(&EntityKey::from(n)))
                    .unwrap_or(false),
                _ => false,
            };

            if let Value::Object(map) = item {
                map.insert(field.clone(), Value::Bool(bound));
            }
        }
    }
}
