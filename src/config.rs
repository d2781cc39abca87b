//! Configuration for entity-binder

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::BinderError;
use crate::model::RelationKind;
use crate::registry::{is_sql_identifier, is_well_formed_type_id};

/// Path segments the HTTP API claims for itself
const RESERVED_KIND_NAMES: [&str; 3] = ["add", "remove", "health"];

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("entity-binder")
}

/// Entity type exposed as a bind target, checked against a table in the bind database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityTypeConfig {
    /// Namespace-qualified id, e.g. `catalog.Item`
    pub type_id: String,

    /// Human-readable name used in error messages (defaults to the model part of `type_id`)
    #[serde(default)]
    pub display_name: Option<String>,

    /// Table holding the entities
    pub table: String,

    /// Primary key column
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Relation kinds this type may be a target of (all kinds when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<String>>,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// SQLite file name inside `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// HTTP bind host
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Relation kinds accepted from the transport
    #[serde(default = "default_relation_kinds")]
    pub relation_kinds: Vec<String>,

    /// Prefix of the headers carrying the authenticated principal,
    /// set by the upstream gateway (`<prefix>-type`, `<prefix>-id`, ...)
    #[serde(default = "default_principal_header_prefix")]
    pub principal_header_prefix: String,

    /// Capacity of the notification broadcast channel
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// How long a write waits for a lock held by another process
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Registered target (and author) entity types
    #[serde(default)]
    pub entity_types: Vec<EntityTypeConfig>,
}

fn default_database_file() -> String {
    "binder.db".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8095
}

fn default_relation_kinds() -> Vec<String> {
    vec![
        RelationKind::WISHLIST.to_string(),
        RelationKind::BLACKLIST.to_string(),
    ]
}

fn default_principal_header_prefix() -> String {
    "x-principal".to_string()
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_key_column() -> String {
    "id".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            http_host: default_http_host(),
            http_port: default_http_port(),
            relation_kinds: default_relation_kinds(),
            principal_header_prefix: default_principal_header_prefix(),
            event_bus_capacity: default_event_bus_capacity(),
            busy_timeout_ms: default_busy_timeout_ms(),
            entity_types: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BinderError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| BinderError::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BinderError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BinderError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject kinds, type ids and table names the engine cannot use
    pub fn validate(&self) -> Result<(), BinderError> {
        if self.relation_kinds.is_empty() {
            return Err(BinderError::Config("relation_kinds must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for kind in &self.relation_kinds {
            RelationKind::parse(kind)
                .map_err(|_| BinderError::Config(format!("Invalid relation kind '{}'", kind)))?;
            if !seen.insert(kind.as_str()) {
                return Err(BinderError::Config(format!("Relation kind '{}' listed twice", kind)));
            }
            if RESERVED_KIND_NAMES.contains(&kind.as_str()) {
                return Err(BinderError::Config(format!(
                    "Relation kind '{}' collides with an HTTP route",
                    kind
                )));
            }
        }

        for entry in &self.entity_types {
            if !is_well_formed_type_id(&entry.type_id) {
                return Err(BinderError::Config(format!(
                    "Entity type id '{}' must look like '<namespace>.<name>'",
                    entry.type_id
                )));
            }
            if let Some(kinds) = &entry.kinds {
                for kind in kinds {
                    if !self.relation_kinds.contains(kind) {
                        return Err(BinderError::Config(format!(
                            "Entity type '{}': relation kind '{}' is not in relation_kinds",
                            entry.type_id, kind
                        )));
                    }
                }
            }
            for ident in [&entry.table, &entry.key_column] {
                if !is_sql_identifier(ident) {
                    return Err(BinderError::Config(format!(
                        "Entity type '{}': '{}' is not a valid SQL identifier",
                        entry.type_id, ident
                    )));
                }
            }
        }

        Ok(())
    }

    /// Parsed relation kinds (call after `validate`)
    pub fn kinds(&self) -> Result<Vec<RelationKind>, BinderError> {
        self.relation_kinds.iter().map(|k| RelationKind::parse(k)).collect()
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.http_port, 8095);
        assert_eq!(config.relation_kinds, vec!["wishlist", "blacklist"]);
        assert!(config.validate().is_ok());
        assert!(config.database_path().ends_with("binder.db"));
    }

    #[test]
    fn test_parse_entity_types() {
        let config: Config = toml::from_str(
            r#"
            http_port = 9000
            relation_kinds = ["wishlist", "blacklist", "read_later"]

            [[entity_types]]
            type_id = "catalog.Item"
            table = "items"

            [[entity_types]]
            type_id = "user.User"
            display_name = "user account"
            table = "users"
            key_column = "user_id"
            kinds = ["blacklist"]
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.kinds().unwrap().len(), 3);
        assert_eq!(config.entity_types[0].key_column, "id");
        assert_eq!(config.entity_types[1].display_name.as_deref(), Some("user account"));
        assert!(config.entity_types[0].kinds.is_none());
        assert_eq!(config.entity_types[1].kinds, Some(vec!["blacklist".to_string()]));
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let mut config = Config::default();
        config.relation_kinds = vec!["wishlist".into(), "wishlist".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relation_kinds = vec!["Wish List".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relation_kinds = vec!["remove".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.entity_types.push(EntityTypeConfig {
            type_id: "catalog.Item".into(),
            display_name: None,
            table: "items; --".into(),
            key_column: "id".into(),
            kinds: None,
        });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.entity_types.push(EntityTypeConfig {
            type_id: "catalog.Item".into(),
            display_name: None,
            table: "items".into(),
            key_column: "id".into(),
            kinds: Some(vec!["read_later".into()]),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.http_port = 9123;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.http_port, 9123);
    }
}
