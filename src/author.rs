//! Author resolution
//!
//! The author of a bind is never read from the request payload. It comes from
//! the authenticated principal, optionally redirected to an owning entity
//! (a staff account acting for its shop, a user acting through a profile).
//!
//! Authentication itself happens upstream; [`HeaderPrincipalExtractor`] only
//! reads the identity the gateway forwarded.

use std::collections::HashMap;
use std::sync::Arc;

use hyper::HeaderMap;

use crate::error::BinderError;
use crate::model::{AssociationCapable, EntityKey, EntityRef};

/// Authenticated caller, before resolution to an author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub entity: EntityRef,
    /// Owning entity declared by the principal itself
    pub acts_as: Option<EntityRef>,
}

impl Principal {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            acts_as: None,
        }
    }

    pub fn acting_as(mut self, owner: EntityRef) -> Self {
        self.acts_as = Some(owner);
        self
    }
}

impl AssociationCapable for Principal {
    fn entity_ref(&self) -> EntityRef {
        self.entity.clone()
    }
}

/// Map a principal to the entity that authors binds
///
/// Implementations must be deterministic and side-effect free.
pub trait AuthorResolver: Send + Sync {
    fn resolve(&self, principal: &Principal) -> EntityRef;
}

/// The principal's declared owner if any, otherwise the principal itself
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthorResolver;

impl AuthorResolver for DefaultAuthorResolver {
    fn resolve(&self, principal: &Principal) -> EntityRef {
        principal
            .acts_as
            .clone()
            .unwrap_or_else(|| principal.entity_ref())
    }
}

type DelegateFn = dyn Fn(&Principal) -> Option<EntityRef> + Send + Sync;

/// Per-principal-type delegation, registered at startup
///
/// Falls back to [`DefaultAuthorResolver`] when no delegate is registered for
/// the principal's type or the delegate returns `None`.
#[derive(Clone, Default)]
pub struct DelegationResolver {
    delegates: HashMap<String, Arc<DelegateFn>>,
}

impl DelegationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delegate<F>(mut self, principal_type_id: &str, delegate: F) -> Self
    where
        F: Fn(&Principal) -> Option<EntityRef> + Send + Sync + 'static,
    {
        self.delegates
            .insert(principal_type_id.to_lowercase(), Arc::new(delegate));
        self
    }
}

impl AuthorResolver for DelegationResolver {
    fn resolve(&self, principal: &Principal) -> EntityRef {
        self.delegates
            .get(&principal.entity.type_id.to_lowercase())
            .and_then(|delegate| delegate(principal))
            .unwrap_or_else(|| DefaultAuthorResolver.resolve(principal))
    }
}

/// Reads the principal forwarded by the authenticating gateway
///
/// Headers (with the default prefix):
/// - `x-principal-type`, `x-principal-id` - required
/// - `x-principal-acts-as-type`, `x-principal-acts-as-id` - optional, together
#[derive(Debug, Clone)]
pub struct HeaderPrincipalExtractor {
    type_header: String,
    id_header: String,
    acts_as_type_header: String,
    acts_as_id_header: String,
}

impl HeaderPrincipalExtractor {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.to_ascii_lowercase();
        Self {
            type_header: format!("{}-type", prefix),
            id_header: format!("{}-id", prefix),
            acts_as_type_header: format!("{}-acts-as-type", prefix),
            acts_as_id_header: format!("{}-acts-as-id", prefix),
        }
    }

    pub fn extract(&self, headers: &HeaderMap) -> Result<Principal, BinderError> {
        let entity = match self.read_ref(headers, &self.type_header, &self.id_header)? {
            Some(entity) => entity,
            None => {
                return Err(BinderError::Unauthorized(
                    "Authentication credentials were not provided.".into(),
                ))
            }
        };

        let acts_as = self.read_ref(headers, &self.acts_as_type_header, &self.acts_as_id_header)?;

        Ok(Principal { entity, acts_as })
    }

    fn read_ref(
        &self,
        headers: &HeaderMap,
        type_header: &str,
        id_header: &str,
    ) -> Result<Option<EntityRef>, BinderError> {
        let type_id = header_str(headers, type_header)?;
        let id = header_str(headers, id_header)?;

        match (type_id, id) {
            (Some(type_id), Some(id)) => {
                let key = EntityKey::new(id).map_err(|_| {
                    BinderError::Unauthorized(format!("Header {} is blank", id_header))
                })?;
                Ok(Some(EntityRef::new(type_id, key)))
            }
            (None, None) => Ok(None),
            _ => Err(BinderError::Unauthorized(format!(
                "Headers {} and {} must be sent together",
                type_header, id_header
            ))),
        }
    }
}

impl Default for HeaderPrincipalExtractor {
    fn default() -> Self {
        Self::new("x-principal")
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, BinderError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| BinderError::Unauthorized(format!("Header {} is not valid ASCII", name))),
        None => Ok(None),
    }
}
