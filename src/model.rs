//! Core bind types
//!
//! Authors and targets are both addressed by [`EntityRef`]: a registered type
//! identifier plus an opaque primary key. Nothing in the engine knows the
//! shape of the entities behind those references.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BinderError, NON_FIELD_ERRORS};

// =============================================================================
// Keys and references
// =============================================================================

/// Primary key of an entity, normalised to text
///
/// Deserializes from either a JSON string or a non-negative integer so that
/// `9` and `"9"` address the same entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    /// Create a key, rejecting blank values
    pub fn new(key: impl Into<String>) -> Result<Self, BinderError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(BinderError::validation(
                "target_object_id",
                "This field may not be blank.",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wrap a key read back from storage, which was validated on the way in
    pub(crate) fn from_stored(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntityKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawKey {
            Int(u64),
            Str(String),
        }

        match RawKey::deserialize(deserializer)? {
            RawKey::Int(n) => Ok(EntityKey::from(n)),
            RawKey::Str(s) => EntityKey::new(s).map_err(serde::de::Error::custom),
        }
    }
}

/// Type-tagged reference to any entity, author or target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_id: String,
    pub key: EntityKey,
}

impl EntityRef {
    pub fn new(type_id: impl Into<String>, key: EntityKey) -> Self {
        Self {
            type_id: type_id.into(),
            key,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_id, self.key)
    }
}

/// Anything that can act as an author or target of a bind
///
/// Entity types gain wishlist/blacklist behaviour by being addressable, not
/// by inheriting from a base type.
pub trait AssociationCapable {
    fn entity_ref(&self) -> EntityRef;
}

impl AssociationCapable for EntityRef {
    fn entity_ref(&self) -> EntityRef {
        self.clone()
    }
}

// =============================================================================
// Relation kinds
// =============================================================================

/// Named category of association
///
/// Modelled as data so embedding applications can add kinds without touching
/// the store or the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RelationKind(Cow<'static, str>);

impl RelationKind {
    pub const WISHLIST: RelationKind = RelationKind(Cow::Borrowed("wishlist"));
    pub const BLACKLIST: RelationKind = RelationKind(Cow::Borrowed("blacklist"));

    /// Parse a kind name: lowercase ASCII letters, digits and `_`, starting with a letter
    pub fn parse(name: &str) -> Result<Self, BinderError> {
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !valid {
            return Err(BinderError::validation(
                "type",
                format!("\"{}\" is not a valid relation kind.", name),
            ));
        }

        Ok(Self(Cow::Owned(name.to_string())))
    }

    pub(crate) fn from_stored(name: String) -> Self {
        Self(Cow::Owned(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the boolean field attached to rendered targets, e.g. `is_wishlisted`
    pub fn state_field(&self) -> String {
        if self.0.ends_with('e') {
            format!("is_{}d", self.0)
        } else {
            format!("is_{}ed", self.0)
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RelationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        RelationKind::parse(&name).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Actions and binds
// =============================================================================

/// Mutation requested through the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindAction {
    Add,
    Remove,
}

impl BindAction {
    pub const ALLOWED: [&'static str; 2] = ["add", "remove"];

    /// Parse an action name, case-insensitively
    pub fn parse(action: &str) -> Result<Self, BinderError> {
        match action.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            _ => Err(BinderError::validation(
                NON_FIELD_ERRORS,
                format!(
                    "Action {} is not allowed. Allowed actions: {}",
                    action,
                    Self::ALLOWED.join(", ")
                ),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for BindAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted association between an author and a target under a kind
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bind {
    pub id: String,
    pub author: EntityRef,
    pub target: EntityRef,
    pub kind: RelationKind,
    pub created_at: String,
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.author, self.target, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_accepts_int_and_string() {
        let from_int: EntityKey = serde_json::from_str("9").unwrap();
        let from_str: EntityKey = serde_json::from_str("\"9\"").unwrap();
        assert_eq!(from_int, from_str);
        assert_eq!(from_int.as_str(), "9");
    }

    #[test]
    fn test_entity_key_rejects_blank() {
        assert!(serde_json::from_str::<EntityKey>("\"  \"").is_err());
        assert!(serde_json::from_str::<EntityKey>("-3").is_err());
        assert!(EntityKey::new("").is_err());
    }

    #[test]
    fn test_relation_kind_parse() {
        assert_eq!(RelationKind::parse("wishlist").unwrap(), RelationKind::WISHLIST);
        assert!(RelationKind::parse("Wishlist").is_err());
        assert!(RelationKind::parse("").is_err());
        assert!(RelationKind::parse("1st").is_err());
        assert!(RelationKind::parse("read_later").is_ok());
    }

    #[test]
    fn test_state_field_names() {
        assert_eq!(RelationKind::WISHLIST.state_field(), "is_wishlisted");
        assert_eq!(RelationKind::BLACKLIST.state_field(), "is_blacklisted");
        assert_eq!(RelationKind::parse("favourite").unwrap().state_field(), "is_favourited");
    }

    #[test]
    fn test_bind_action_parse() {
        assert_eq!(BindAction::parse("ADD").unwrap(), BindAction::Add);
        assert_eq!(BindAction::parse("remove").unwrap(), BindAction::Remove);

        match BindAction::parse("toggle") {
            Err(BinderError::Validation { field, message }) => {
                assert_eq!(field, NON_FIELD_ERRORS);
                assert!(message.contains("Action toggle is not allowed"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_entity_ref_structural_equality() {
        let a = EntityRef::new("user.user", EntityKey::from(1));
        let b = EntityRef::new("user.user", EntityKey::new("1").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "user.user:1");
    }
}
