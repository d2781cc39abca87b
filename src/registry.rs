//! Entity type registry
//!
//! Turns an opaque `"<namespace>.<name>"` identifier into a descriptor that can
//! answer "does this key exist?". Populated once at startup through
//! [`RegistryBuilder`]; the built registry has no mutating methods and is
//! shared behind an `Arc`.
//!
//! Existence is a capability ([`EntityExistence`]) rather than a type lookup,
//! so any backend can sit behind a type id:
//!
//! - [`SqlTableExistence`] - a table in the bind database (what the daemon uses)
//! - [`KeySet`] - a fixed set of keys
//! - any `Fn(&EntityKey) -> Result<bool, BinderError>` closure

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EntityTypeConfig;
use crate::db::BinderDb;
use crate::error::BinderError;
use crate::model::{EntityKey, EntityRef, RelationKind};

/// Check whether a key exists for one entity type
///
/// Absence is `Ok(false)`; errors are reserved for the backend failing.
pub trait EntityExistence: Send + Sync {
    fn exists(&self, key: &EntityKey) -> Result<bool, BinderError>;
}

impl<F> EntityExistence for F
where
    F: Fn(&EntityKey) -> Result<bool, BinderError> + Send + Sync,
{
    fn exists(&self, key: &EntityKey) -> Result<bool, BinderError> {
        self(key)
    }
}

/// Fixed set of existing keys
#[derive(Debug, Clone, Default)]
pub struct KeySet(HashSet<EntityKey>);

impl KeySet {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EntityKey>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }
}

impl EntityExistence for KeySet {
    fn exists(&self, key: &EntityKey) -> Result<bool, BinderError> {
        Ok(self.0.contains(key))
    }
}

/// Existence backed by a table in the bind database
pub struct SqlTableExistence {
    db: Arc<BinderDb>,
    sql: String,
}

impl SqlTableExistence {
    pub fn new(db: Arc<BinderDb>, table: &str, key_column: &str) -> Result<Self, BinderError> {
        for ident in [table, key_column] {
            if !is_sql_identifier(ident) {
                return Err(BinderError::Config(format!(
                    "'{}' is not a valid SQL identifier",
                    ident
                )));
            }
        }

        Ok(Self {
            db,
            sql: format!(
                "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE \"{}\" = ?)",
                table, key_column
            ),
        })
    }
}

impl EntityExistence for SqlTableExistence {
    fn exists(&self, key: &EntityKey) -> Result<bool, BinderError> {
        self.db.with_conn(|conn| {
            conn.query_row(&self.sql, [key.as_str()], |row| row.get::<_, bool>(0))
                .map_err(|e| BinderError::Database(format!("Existence check failed: {}", e)))
        })
    }
}

/// Plain `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_sql_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `<namespace>.<name>` with both parts non-empty and no further dots
pub fn is_well_formed_type_id(type_id: &str) -> bool {
    match type_id.split_once('.') {
        Some((namespace, name)) => {
            !namespace.is_empty() && !name.is_empty() && !name.contains('.')
        }
        None => false,
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Registered entity type
#[derive(Clone)]
pub struct EntityTypeDescriptor {
    type_id: String,
    display_name: String,
    existence: Arc<dyn EntityExistence>,
    /// Kinds this type may be a target of; `None` accepts every kind
    kinds: Option<HashSet<RelationKind>>,
}

impl EntityTypeDescriptor {
    pub fn new(
        type_id: impl Into<String>,
        display_name: impl Into<String>,
        existence: Arc<dyn EntityExistence>,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            display_name: display_name.into(),
            existence,
            kinds: None,
        }
    }

    /// Restrict the relation kinds this type can be a target of
    pub fn with_kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = RelationKind>,
    {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Whether binds of `kind` may target this type
    pub fn accepts(&self, kind: &RelationKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(kind))
    }

    /// Canonical type id, as stored in binds
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn exists(&self, key: &EntityKey) -> Result<bool, BinderError> {
        self.existence.exists(key)
    }

    pub fn entity_ref(&self, key: EntityKey) -> EntityRef {
        EntityRef::new(self.type_id.clone(), key)
    }

    /// e.g. `Item with pk=9 does not exist.`
    pub fn not_found_message(&self, key: &EntityKey) -> String {
        format!("{} with pk={} does not exist.", self.title(), key)
    }

    /// e.g. `Item cannot be used as a blacklist item.`
    pub fn ineligible_message(&self, kind: &RelationKind) -> String {
        format!("{} cannot be used as a {} item.", self.title(), kind)
    }

    fn title(&self) -> String {
        let mut chars = self.display_name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => self.type_id.clone(),
        }
    }
}

impl fmt::Debug for EntityTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTypeDescriptor")
            .field("type_id", &self.type_id)
            .field("display_name", &self.display_name)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Startup-time builder for [`EntityTypeRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    types: HashMap<String, EntityTypeDescriptor>,
}

impl RegistryBuilder {
    /// Register a descriptor; type ids are unique case-insensitively
    pub fn register(mut self, descriptor: EntityTypeDescriptor) -> Result<Self, BinderError> {
        if !is_well_formed_type_id(descriptor.type_id()) {
            return Err(BinderError::Config(format!(
                "Entity type id '{}' must look like '<namespace>.<name>'",
                descriptor.type_id()
            )));
        }

        let lookup_key = descriptor.type_id().to_lowercase();
        if self.types.contains_key(&lookup_key) {
            return Err(BinderError::Config(format!(
                "Entity type '{}' registered twice",
                descriptor.type_id()
            )));
        }

        debug!(type_id = %descriptor.type_id(), "Registered entity type");
        self.types.insert(lookup_key, descriptor);
        Ok(self)
    }

    pub fn build(self) -> EntityTypeRegistry {
        info!(count = self.types.len(), "Entity type registry ready");
        EntityTypeRegistry { types: self.types }
    }
}

/// Read-only map from type id to descriptor
#[derive(Debug)]
pub struct EntityTypeRegistry {
    types: HashMap<String, EntityTypeDescriptor>,
}

impl EntityTypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build the registry from `[[entity_types]]` config, checking against tables in `db`
    pub fn from_config(
        entity_types: &[EntityTypeConfig],
        db: Arc<BinderDb>,
    ) -> Result<Self, BinderError> {
        let mut builder = Self::builder();
        for entry in entity_types {
            let existence = SqlTableExistence::new(db.clone(), &entry.table, &entry.key_column)?;
            let display_name = entry
                .display_name
                .clone()
                .unwrap_or_else(|| default_display_name(&entry.type_id));
            let mut descriptor =
                EntityTypeDescriptor::new(entry.type_id.clone(), display_name, Arc::new(existence));
            if let Some(kinds) = &entry.kinds {
                let kinds = kinds
                    .iter()
                    .map(|k| RelationKind::parse(k))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| {
                        BinderError::Config(format!(
                            "Entity type '{}' lists an invalid relation kind",
                            entry.type_id
                        ))
                    })?;
                descriptor = descriptor.with_kinds(kinds);
            }
            builder = builder.register(descriptor)?;
        }
        Ok(builder.build())
    }

    /// Resolve a type id (case-insensitive)
    pub fn resolve(&self, type_id: &str) -> Result<&EntityTypeDescriptor, BinderError> {
        self.types
            .get(&type_id.to_lowercase())
            .ok_or_else(|| BinderError::TypeNotFound(type_id.to_string()))
    }

    /// Check a key; fails only when the type itself is unknown or the backend errors
    pub fn exists(&self, type_id: &str, key: &EntityKey) -> Result<bool, BinderError> {
        self.resolve(type_id)?.exists(key)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Canonical ids of all registered types
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.types.values().map(|d| d.type_id()).collect();
        ids.sort_unstable();
        ids
    }
}

/// `catalog.Item` -> `item`
fn default_display_name(type_id: &str) -> String {
    type_id
        .rsplit_once('.')
        .map(|(_, name)| name)
        .unwrap_or(type_id)
        .to_lowercase()
}
